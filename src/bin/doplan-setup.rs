fn main() {
    let code = doplan_launcher::run_setup();
    if code != 0 {
        std::process::exit(code);
    }
}
