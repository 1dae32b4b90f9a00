use docopt::Docopt;
use serde::Deserialize;

use murmur::{AggregationType, MurmurFile};

const USAGE: &str = "
murmur: a fixed-size, round-robin time series database.

Usage:
    murmur create <path> <spec>...
    murmur dump <path>
    murmur info <path>
    murmur (-h | --help)

Commands:
    create   create a new database file (fails if <path> already exists)
    dump     print every stored point as `<interval> = <value>`
    info     print a human-readable header/archive summary

Options:
    -h, --help  Show this screen.
";

#[derive(Debug, Deserialize)]
struct Args {
    cmd_create: bool,
    cmd_dump: bool,
    cmd_info: bool,
    arg_path: String,
    arg_spec: Vec<String>,
}

fn create(path: &str, specs: &[String]) -> murmur::Result<()> {
    MurmurFile::create(path, specs, AggregationType::Average, 50)?;
    Ok(())
}

fn dump(path: &str) -> murmur::Result<()> {
    let db = MurmurFile::open(path)?;
    print!("{}", db.dump());
    Ok(())
}

fn info(path: &str) -> murmur::Result<()> {
    let db = MurmurFile::open(path)?;
    print!("{}", db.dump_info());
    Ok(())
}

fn main() {
    env_logger::init();

    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let result = if args.cmd_create {
        create(&args.arg_path, &args.arg_spec)
    } else if args.cmd_dump {
        dump(&args.arg_path)
    } else if args.cmd_info {
        info(&args.arg_path)
    } else {
        Ok(())
    };

    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(1);
    }
}
