use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "bundl",
    about = "Bundled multi-file uploads over multipart/related",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the upload server
    Serve(ServeArgs),
    /// Pack local files into a bundle body
    Pack(PackArgs),
    /// List the manifest and parts of a bundle body
    Inspect(InspectArgs),
    /// Upload a bundle body into a local directory
    Apply(ApplyArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    #[arg(long)]
    pub root: Option<PathBuf>,
    /// Write files in place instead of staging through part files
    #[arg(long)]
    pub direct: bool,
}

#[derive(Args)]
pub struct PackArgs {
    /// Files to pack, as LOCAL or LOCAL=REMOTE
    #[arg(required = true)]
    pub files: Vec<String>,
    #[arg(short, long)]
    pub output: PathBuf,
    #[arg(long)]
    pub boundary: Option<String>,
    /// Record each file's modification time in the manifest
    #[arg(long)]
    pub keep_mtime: bool,
}

#[derive(Args)]
pub struct InspectArgs {
    pub input: PathBuf,
    /// Content-Type the body was sent with
    #[arg(long)]
    pub content_type: String,
}

#[derive(Args)]
pub struct ApplyArgs {
    pub input: PathBuf,
    /// Content-Type the body was sent with
    #[arg(long)]
    pub content_type: String,
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
    /// Collection below the root receiving the files
    #[arg(long, default_value = "")]
    pub collection: String,
    /// Print the multi-status document instead of a summary
    #[arg(long)]
    pub xml: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve_defaults() {
        let cli = Cli::try_parse_from(["bundl", "serve"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert!(args.config.is_none());
            assert!(args.bind.is_none());
            assert!(!args.direct);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_serve_overrides() {
        let cli = Cli::try_parse_from([
            "bundl", "serve", "-c", "bundl.toml", "--bind", "0.0.0.0:9000", "--root", "/srv",
        ])
        .unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.config, Some(PathBuf::from("bundl.toml")));
            assert_eq!(args.bind.unwrap().port(), 9000);
            assert_eq!(args.root, Some(PathBuf::from("/srv")));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_serve_rejects_bad_address() {
        assert!(Cli::try_parse_from(["bundl", "serve", "--bind", "nowhere"]).is_err());
    }

    #[test]
    fn parse_pack() {
        let cli = Cli::try_parse_from(["bundl", "pack", "a.txt", "b.txt=docs/b.txt", "-o", "out.bin"]).unwrap();
        if let Command::Pack(args) = cli.command {
            assert_eq!(args.files, vec!["a.txt", "b.txt=docs/b.txt"]);
            assert_eq!(args.output, PathBuf::from("out.bin"));
            assert!(!args.keep_mtime);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_pack_requires_files() {
        assert!(Cli::try_parse_from(["bundl", "pack", "-o", "out.bin"]).is_err());
    }

    #[test]
    fn parse_apply() {
        let cli = Cli::try_parse_from([
            "bundl", "apply", "body.bin",
            "--content-type", "multipart/related; boundary=b; start=m",
            "--collection", "files", "--xml",
        ])
        .unwrap();
        if let Command::Apply(args) = cli.command {
            assert_eq!(args.collection, "files");
            assert_eq!(args.root, PathBuf::from("."));
            assert!(args.xml);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_verbose_global() {
        let cli = Cli::try_parse_from(["bundl", "inspect", "x", "--content-type", "t", "-v"]).unwrap();
        assert!(cli.verbose);
    }
}
