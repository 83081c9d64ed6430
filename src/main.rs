use std::path::Path;
use std::process;

use elevkit::commands::{build_cli, CommandFactory, ElevkitCommandFactory};
use elevkit::utils::logger::Logger;

fn main() {
    let matches = build_cli().get_matches();

    let log_file = matches.get_one::<String>("log-file").map(Path::new);
    if let Err(e) = Logger::init_global_logger(log_file, matches.get_flag("verbose")) {
        eprintln!("Error setting up logger: {}", e);
        process::exit(1);
    }

    let factory = ElevkitCommandFactory::new();
    let result = factory.create_command(&matches).and_then(|command| command.execute());

    if let Err(e) = result {
        eprintln!("{}", e);
        process::exit(e.exit_code());
    }
}
