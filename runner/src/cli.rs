use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use config::shared::{OutputOrdering, TransformConfig};
use pipeline::transform::IdentityTransform;

#[derive(Parser, Debug)]
#[command(name = "runner", version, about = "Runs record pipelines over record files")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Transform every record of an input file, or of each file in an input directory.
    Run(RunArgs),
    /// List the registered transforms.
    Transforms,
    /// Print the URLs that a previous output has not recorded as successful.
    Unseen(UnseenArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Input record file or directory of record files.
    pub input: PathBuf,

    /// Output record file, or directory when the input is a directory.
    pub output: PathBuf,

    /// Registered transform to apply.
    #[arg(long, conflicts_with = "script")]
    pub transform: Option<String>,

    /// Mapping script to apply instead of a registered transform.
    #[arg(long, requires = "entry_point")]
    pub script: Option<PathBuf>,

    /// Entry point of the mapping script.
    #[arg(long, requires = "script")]
    pub entry_point: Option<String>,

    /// Number of transform workers.
    #[arg(long, env = "APP_PIPELINE__WORKERS")]
    pub parallelism: Option<usize>,

    /// Order in which results are written.
    #[arg(long, value_enum, env = "APP_PIPELINE__ORDERING")]
    pub ordering: Option<Ordering>,
}

impl RunArgs {
    /// Transform selected by the flags, defaulting to the identity transform.
    pub fn transform_config(&self) -> TransformConfig {
        match (&self.script, &self.entry_point, &self.transform) {
            (Some(path), Some(entry_point), _) => TransformConfig::script(path, entry_point),
            (_, _, Some(name)) => TransformConfig::builtin(name),
            _ => TransformConfig::builtin(IdentityTransform::NAME),
        }
    }
}

#[derive(Args, Debug)]
pub struct UnseenArgs {
    /// Text file with one URL per line.
    pub urls: PathBuf,

    /// Output record file of a previous run.
    #[arg(long)]
    pub seen: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum Ordering {
    Arrival,
    Input,
}

impl From<Ordering> for OutputOrdering {
    fn from(value: Ordering) -> Self {
        match value {
            Ordering::Arrival => OutputOrdering::Arrival,
            Ordering::Input => OutputOrdering::Input,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_defaults_to_identity() {
        let Command::Run(args) = parse(&["runner", "run", "in.jsonl", "out.jsonl"]).command else {
            panic!("expected run");
        };

        assert_eq!(args.transform_config(), TransformConfig::builtin("identity"));
        assert_eq!(args.ordering, None);
    }

    #[test]
    fn script_flags_select_a_script() {
        let Command::Run(args) = parse(&[
            "runner",
            "run",
            "in",
            "out",
            "--script",
            "maps.json",
            "--entry-point",
            "products",
            "--parallelism",
            "4",
            "--ordering",
            "input",
        ])
        .command
        else {
            panic!("expected run");
        };

        assert_eq!(
            args.transform_config(),
            TransformConfig::script("maps.json", "products")
        );
        assert_eq!(args.parallelism, Some(4));
        assert_eq!(args.ordering.map(OutputOrdering::from), Some(OutputOrdering::Input));
    }

    #[test]
    fn script_requires_an_entry_point() {
        assert!(Cli::try_parse_from(["runner", "run", "in", "out", "--script", "maps.json"]).is_err());
    }

    #[test]
    fn transform_and_script_conflict() {
        let result = Cli::try_parse_from([
            "runner",
            "run",
            "in",
            "out",
            "--transform",
            "identity",
            "--script",
            "maps.json",
            "--entry-point",
            "products",
        ]);

        assert!(result.is_err());
    }
}
