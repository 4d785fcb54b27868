use std::{
    fs::File,
    io::{self, Write},
    process::ExitCode,
    time::Duration,
};

use bucketfs::{
    adapters::{gcs::GcsClient, s3::S3Client, ObjectClient},
    storage::DEFAULT_URL_EXPIRATION,
    util::object::{parse_bucket_uri, BucketUri, Provider},
    Config, FSError, ObjectEntry, StepReport, StorageAdapter,
};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::{error, info, span, Level};

type Client = Box<dyn ObjectClient + Send>;

fn cli() -> Command {
    let path = || Arg::new("PATH").required(true).index(1);
    let pair = |cmd: Command| {
        cmd.arg(Arg::new("SRC").required(true).index(1))
            .arg(Arg::new("DST").required(true).index(2))
    };

    Command::new("bucketfs")
        .version(clap::crate_version!())
        .about("Filesystem-style operations on an object-storage bucket")
        .arg(
            Arg::new("BUCKET_URI")
                .help("s3://bucket[/prefix] or gs://bucket[/prefix]")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("ls")
                .arg(Arg::new("DIR").index(1))
                .arg(
                    Arg::new("recursive")
                        .short('r')
                        .long("recursive")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("raw")
                        .long("raw")
                        .help("print keys as stored, prefix included")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("cat").arg(path()))
        .subcommand(
            Command::new("put")
                .arg(path())
                .arg(Arg::new("FILE").required(true).index(2))
                .arg(Arg::new("mimetype").long("mimetype")),
        )
        .subcommand(Command::new("rm").arg(path()))
        .subcommand(Command::new("rmdir").arg(path()))
        .subcommand(Command::new("mkdir").arg(path()))
        .subcommand(pair(Command::new("cp")))
        .subcommand(pair(Command::new("mv")))
        .subcommand(Command::new("stat").arg(path()))
        .subcommand(Command::new("exists").arg(path()))
        .subcommand(
            Command::new("url").arg(path()).arg(
                Arg::new("expire")
                    .long("expire")
                    .help("lifetime in seconds")
                    .value_parser(clap::value_parser!(u64)),
            ),
        )
}

fn arg<'m>(matches: &'m ArgMatches, name: &str) -> Result<&'m str, FSError> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| FSError::invalid_argument(format!("missing argument: {}", name)))
}

fn format_entry(entry: &ObjectEntry) -> String {
    let kind = if entry.is_dir() { "dir" } else { "file" };

    format!(
        "{}\t{}\t{}\t{}",
        kind,
        entry.size.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
        entry
            .timestamp
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string()),
        entry.path
    )
}

fn check_report(report: StepReport) -> Result<(), FSError> {
    match report.failed {
        None => Ok(()),
        Some((key, err)) => {
            error!(
                error_message = %err,
                error_group = "partial_failure",
                key = key.as_str(),
                completed = report.completed.len(),
                skipped = report.skipped.len()
            );
            Err(err)
        }
    }
}

fn run(
    client: &(dyn ObjectClient + Send),
    uri: &BucketUri,
    matches: &ArgMatches,
) -> Result<(), FSError> {
    let adapter = StorageAdapter::new(client, &uri.bucket, &uri.prefix);
    let mut out = io::stdout().lock();

    match matches.subcommand() {
        Some(("ls", sub)) => {
            let dir = sub.get_one::<String>("DIR").map(String::as_str).unwrap_or("");
            let recursive = sub.get_flag("recursive");
            let entries = if sub.get_flag("raw") {
                adapter.list_contents_raw(dir, recursive)?
            } else {
                adapter.list_contents(dir, recursive)?
            };

            for entry in entries {
                writeln!(out, "{}", format_entry(&entry))?;
            }
        }
        Some(("cat", sub)) => {
            let mut result = adapter.read_stream(arg(sub, "PATH")?)?;
            io::copy(&mut result.stream, &mut out)?;
        }
        Some(("put", sub)) => {
            let local = arg(sub, "FILE")?;
            let file = File::open(local)?;

            let mut config = Config::default().with_file(local);
            if let Some(mimetype) = sub.get_one::<String>("mimetype") {
                config = config.with_mimetype(mimetype);
            }

            let entry = adapter.write_stream(arg(sub, "PATH")?, file, &config)?;
            writeln!(out, "{}", format_entry(&entry))?;
        }
        Some(("rm", sub)) => adapter.delete(arg(sub, "PATH")?)?,
        Some(("rmdir", sub)) => check_report(adapter.delete_directory(arg(sub, "PATH")?)?)?,
        Some(("mkdir", sub)) => {
            let entry = adapter.create_directory(arg(sub, "PATH")?, &Config::default())?;
            writeln!(out, "{}", format_entry(&entry))?;
        }
        Some(("cp", sub)) => adapter.copy(arg(sub, "SRC")?, arg(sub, "DST")?)?,
        Some(("mv", sub)) => check_report(adapter.rename(arg(sub, "SRC")?, arg(sub, "DST")?)?)?,
        Some(("stat", sub)) => {
            let entry = adapter.get_metadata(arg(sub, "PATH")?)?;
            writeln!(out, "{}", format_entry(&entry))?;
            if let Some(mimetype) = &entry.mimetype {
                writeln!(out, "mimetype\t{}", mimetype)?;
            }
            if let Some(etag) = &entry.etag {
                writeln!(out, "etag\t{}", etag)?;
            }
        }
        Some(("exists", sub)) => {
            writeln!(out, "{}", adapter.has(arg(sub, "PATH")?)?)?;
        }
        Some(("url", sub)) => {
            let expire = sub
                .get_one::<u64>("expire")
                .map(|secs| Duration::from_secs(*secs))
                .unwrap_or(DEFAULT_URL_EXPIRATION);
            let url = adapter.get_temporary_link(arg(sub, "PATH")?, expire)?;
            writeln!(out, "{}", url)?;
        }
        _ => return Err(FSError::invalid_argument("unknown command")),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();

    let level = if matches.get_flag("verbose") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .json()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let span = span!(Level::INFO, "main", context = "main");
    let _e = span.enter();
    info!("called");

    let uri = match arg(&matches, "BUCKET_URI").and_then(parse_bucket_uri) {
        Err(err) => {
            error!(error_message = %err, error_group = "parse_bucket_uri");
            return ExitCode::FAILURE;
        }
        Ok(uri) => uri,
    };
    info!(bucket = %uri.bucket, prefix = %uri.prefix, "args");

    let client: Client = match uri.provider {
        Provider::AWS => Box::new(S3Client::from_env().await),
        Provider::GCS => match GcsClient::from_env().await {
            Err(err) => {
                error!(error_message = %err, error_group = "gcs_client");
                return ExitCode::FAILURE;
            }
            Ok(client) => Box::new(client),
        },
    };

    let res = tokio::task::spawn_blocking(move || run(client.as_ref(), &uri, &matches)).await;

    match res {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(err)) => {
            error!(error_message = %err, error_kind = err.kind.as_str(), error_group = "command");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(error_message = %err, error_group = "join");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_commands() {
        let cases = vec![
            vec!["bucketfs", "s3://bucket", "ls", "-r"],
            vec!["bucketfs", "gs://bucket/prefix", "put", "a.txt", "/tmp/a", "--mimetype", "text/plain"],
            vec!["bucketfs", "s3://bucket", "mv", "a", "b"],
            vec!["bucketfs", "-v", "s3://bucket", "url", "a", "--expire", "60"],
        ];

        for args in cases {
            assert!(cli().try_get_matches_from(&args).is_ok(), "failed for case: {:?}", args);
        }
    }

    #[test]
    fn test_cli_rejects() {
        let cases = vec![
            vec!["bucketfs", "s3://bucket"],
            vec!["bucketfs", "s3://bucket", "cp", "a"],
            vec!["bucketfs", "s3://bucket", "url", "a", "--expire", "soon"],
        ];

        for args in cases {
            assert!(cli().try_get_matches_from(&args).is_err(), "failed for case: {:?}", args);
        }
    }

    #[test]
    fn test_format_entry() {
        let mut entry = ObjectEntry::file("a.txt");
        entry.size = Some(3);
        entry.timestamp = Some(10);

        assert_eq!(format_entry(&entry), "file\t3\t10\ta.txt");
        assert_eq!(format_entry(&ObjectEntry::dir("d")), "dir\t-\t-\td");
    }
}
