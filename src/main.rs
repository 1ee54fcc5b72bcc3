fn main() {
    env_logger::init();

    if handle_cli_flags() {
        return;
    }

    if let Err(err) = sitenotes::run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> bool {
    let mut saw_flag = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("sitenotes {}", sitenotes::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "sitenotes — Annotate documentation pages with contributor cards and discussion links.\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n\nConfiguration is read from the sitenotes config file (config.yaml under\nthe user config directory) and SITENOTES_* environment variables."
                );
                saw_flag = true;
            }
            _ => {}
        }
    }
    saw_flag
}
