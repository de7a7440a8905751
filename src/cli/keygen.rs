//! `covenant keygen`: create an Ed25519 voter key.

use covenant::voting::VoterKey;
use std::fs;
use std::path::Path;

/// Generate a key, write its seed (hex) to `output` and print the account.
///
/// Refuses to overwrite an existing key file unless `force` is set.
pub fn execute(output: String, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(&output);
    if path.exists() && !force {
        return Err(format!(
            "Key file '{}' already exists. Use --force to overwrite it.",
            path.display()
        )
        .into());
    }

    let key = VoterKey::generate()?;
    write_seed(path, &key)?;

    println!("Key written to {}", path.display());
    println!("Account:    {}", key.address());
    println!("Public key: {}", hex::encode(key.public_key()));
    Ok(())
}

/// Read a key file written by `keygen`.
pub fn read_key(path: &Path) -> Result<VoterKey, Box<dyn std::error::Error>> {
    let contents = zeroize::Zeroizing::new(
        fs::read_to_string(path)
            .map_err(|e| format!("Failed to read key file '{}': {}", path.display(), e))?,
    );
    Ok(VoterKey::from_seed_hex(contents.trim())?)
}

fn write_seed(path: &Path, key: &VoterKey) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let seed = key.seed_hex();
    fs::write(path, seed.as_bytes())
        .map_err(|e| format!("Failed to write key file '{}': {}", path.display(), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
