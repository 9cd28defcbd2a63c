fn main() {
    let code = doplan_launcher::run_cli();
    if code != 0 {
        std::process::exit(code);
    }
}
