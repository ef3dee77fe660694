fn main() {
    if let Err(e) = romix_simt::run_from_args(std::env::args_os()) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
