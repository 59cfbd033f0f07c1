/// Display version information
pub fn execute() {
    println!("trustchain {}", env!("CARGO_PKG_VERSION"));
    println!("Invite-tree trust network with one-member-one-vote polls");
}
