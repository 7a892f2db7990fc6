fn main() {
    if let Err(e) = policyvault_lib::run() {
        eprintln!("policyvault: {e}");
        std::process::exit(1);
    }
}
