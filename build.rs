// Re-embed the schema whenever a migration script changes
fn main() {
    println!("cargo:rerun-if-changed=migrations");
}
