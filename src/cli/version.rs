/// Display version information
pub fn execute() {
    println!("covenant {}", env!("CARGO_PKG_VERSION"));
    println!("Operator CLI for covenant DAO governance");
    println!("Vote protocol version {}", super::config::PROTOCOL_VERSION);
}
