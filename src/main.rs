#![forbid(unsafe_code)]

use clap::Parser;
use polybundle::bundle::{self, BuildOptions, CONTENT_BOUNDARY, PAGE_BOUNDARY};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "bundler",
    version,
    about = "Pack an executable and a content file into one self-extracting bundle"
)]
struct Cli {
    /// Executable to embed.
    #[arg(required_unless_present = "inspect")]
    payload: Option<PathBuf>,

    /// Content blob (e.g. a model file) to append after the payload.
    #[arg(required_unless_present = "inspect")]
    content: Option<PathBuf>,

    /// Output path. Defaults to the content path with a `.bundle` extension.
    output: Option<PathBuf>,

    /// Check an existing bundle and print its layout instead of building.
    #[arg(long, value_name = "BUNDLE", conflicts_with_all = ["payload", "content", "output"])]
    inspect: Option<PathBuf>,

    /// Alignment of the payload segment in bytes (power of two).
    #[arg(long, value_name = "BYTES", default_value_t = PAGE_BOUNDARY)]
    page_boundary: u64,

    /// Alignment of the content segment in bytes (power of two).
    #[arg(long, value_name = "BYTES", default_value_t = CONTENT_BOUNDARY)]
    content_boundary: u64,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .format_timestamp(None)
        .format_target(false)
        .init();

    let res = match (cli.inspect, cli.payload, cli.content) {
        (Some(b), _, _) => bundle::inspect(&b).map(|_| ()),
        (None, Some(payload), Some(content)) => {
            let opts = BuildOptions {
                page_boundary: cli.page_boundary,
                content_boundary: cli.content_boundary,
            };
            bundle::build(&payload, &content, cli.output.as_deref(), &opts).map(|_| ())
        }
        _ => {
            eprintln!("error: <PAYLOAD> and <CONTENT> are required");
            std::process::exit(1);
        }
    };

    if let Err(e) = res {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
