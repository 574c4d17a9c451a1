use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use gitdist::artifacts::transport::RemoteUrl;
use gitdist::{
    ChangeKind, CloneOptions, Credential, FetchOutcome, InitOptions, MergeOutcome, PushOutcome, Repository, Server,
    ServerConfig, SyncOptions,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gitdist",
    version = "0.1.0",
    author = "Sami Barbut-Dica",
    about = "A minimal distributed version-control engine",
    help_template = r"
{name} {version} - {about}

USAGE:
    {usage}

OPTIONS:
    {all-args}
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(name = "init", about = "Create an empty repository")]
    Init {
        #[arg(long, help = "Make objects group-writable")]
        shared: bool,
        #[arg(long, help = "Create a repository without a working directory")]
        bare: bool,
        #[arg(short = 'b', long = "initial-branch", help = "Name of the first branch")]
        branch: Option<String>,
        #[arg(index = 1, help = "The path to the repository")]
        path: Option<PathBuf>,
    },
    #[command(name = "clone", about = "Copy a remote repository")]
    Clone {
        #[arg(index = 1, help = "Remote path or gitdist://host:port")]
        url: String,
        #[arg(index = 2, help = "Destination directory")]
        path: Option<PathBuf>,
        #[arg(long, env = "GITDIST_TOKEN", help = "Token presented to the server")]
        token: Option<String>,
        #[arg(long, help = "Make objects group-writable")]
        shared: bool,
    },
    #[command(name = "commit", about = "Record working-directory changes")]
    Commit {
        #[arg(short, long, help = "The commit message")]
        message: String,
        #[arg(index = 1, help = "Restrict the commit to these paths")]
        paths: Vec<String>,
    },
    #[command(name = "status", about = "Show working-directory changes")]
    Status,
    #[command(name = "log", about = "Show the history of the active branch")]
    Log {
        #[arg(short = 'n', long = "max-count", help = "Show at most this many commits")]
        limit: Option<usize>,
        #[arg(long, help = "One line per commit")]
        oneline: bool,
    },
    #[command(name = "fetch", about = "Update remote-tracking branches")]
    Fetch {
        #[arg(long, env = "GITDIST_TOKEN", help = "Token presented to the server")]
        token: Option<String>,
    },
    #[command(name = "merge", about = "Merge the remote-tracking branch")]
    Merge,
    #[command(name = "pull", about = "Fetch and merge")]
    Pull {
        #[arg(long, env = "GITDIST_TOKEN", help = "Token presented to the server")]
        token: Option<String>,
    },
    #[command(name = "push", about = "Publish the active branch")]
    Push {
        #[arg(long, env = "GITDIST_TOKEN", help = "Token presented to the server")]
        token: Option<String>,
    },
    #[command(name = "cat-file", about = "Print the content of an object")]
    CatFile {
        #[arg(short = 'p', long, help = "Object id, abbreviated id or branch")]
        sha: String,
    },
    #[command(name = "serve", about = "Serve a repository over TCP")]
    Serve {
        #[arg(long, default_value = "127.0.0.1:9418", help = "Address to listen on")]
        bind: SocketAddr,
        #[arg(long, env = "GITDIST_TOKEN", help = "Token clients must present")]
        token: Option<String>,
        #[arg(index = 1, help = "Repository to serve")]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            shared,
            bare,
            branch,
            path,
        } => {
            let path = path.map_or_else(std::env::current_dir, Ok)?;
            let options = InitOptions {
                shared,
                bare,
                default_branch: branch,
            };
            let mut repository = Repository::init(&path, options)?;
            println!("Initialized empty repository in {}", repository.git_dir().display());
            repository.free();
        }
        Commands::Clone {
            url,
            path,
            token,
            shared,
        } => {
            let path = match path {
                Some(path) => path,
                None => default_clone_dir(&url)?,
            };
            let options = CloneOptions {
                credential: token.map(Credential::Token),
                shared,
                ..CloneOptions::default()
            };
            let mut repository = Repository::clone(&url, &path, options).await?;
            println!("Cloned into {}", path.display());
            repository.free();
        }
        Commands::Commit { message, paths } => {
            let mut repository = open_current()?;
            let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
            let is_root = repository.head()?.is_none();
            let oid = repository.commit(&paths, &message)?;
            let commit = repository.lookup_commit(&oid)?;
            println!(
                "[{} {}{}] {}",
                repository.current_branch()?,
                if is_root { "(root-commit) " } else { "" },
                oid.to_short_oid(),
                commit.short_message()
            );
        }
        Commands::Status => {
            let repository = open_current()?;
            for (path, kind) in repository.status()? {
                let marker = kind.status_char().to_string();
                let marker = match kind {
                    ChangeKind::Added => marker.as_str().green(),
                    ChangeKind::Modified => marker.as_str().yellow(),
                    ChangeKind::Deleted => marker.as_str().red(),
                };
                println!("{marker} {}", path.display());
            }
        }
        Commands::Log { limit, oneline } => {
            let repository = open_current()?;
            for (oid, commit) in repository.log(limit)? {
                if oneline {
                    println!("{} {}", oid.to_short_oid().as_str().yellow(), commit.short_message());
                    continue;
                }

                println!("{}", format!("commit {oid}").as_str().yellow());
                if commit.is_merge() {
                    let parents: Vec<String> = commit.parents().iter().map(|p| p.to_short_oid()).collect();
                    println!("Merge:  {}", parents.join(" "));
                }
                println!("Author: {}", commit.author().display_name());
                println!("Date:   {}", commit.author().readable_timestamp());
                println!();
                for line in commit.message().lines() {
                    println!("    {line}");
                }
                println!();
            }
        }
        Commands::Fetch { token } => {
            let mut repository = open_current()?;
            let outcome = repository.fetch_with(sync_options(token)).await?;
            print_fetch(&outcome);
        }
        Commands::Merge => {
            let mut repository = open_current()?;
            let outcome = repository.merge().await?;
            print_merge(&outcome);
        }
        Commands::Pull { token } => {
            let mut repository = open_current()?;
            let outcome = repository.pull_with(sync_options(token)).await?;
            print_merge(&outcome);
        }
        Commands::Push { token } => {
            let mut repository = open_current()?;
            match repository.push_with(sync_options(token)).await? {
                PushOutcome::UpToDate => println!("Everything up-to-date"),
                PushOutcome::Pushed {
                    branch,
                    old,
                    new,
                    objects,
                } => {
                    let old = old.map_or_else(|| "(new branch)".to_string(), |oid| oid.to_short_oid());
                    println!("{old}..{} {branch} ({objects} objects)", new.to_short_oid());
                }
            }
        }
        Commands::CatFile { sha } => {
            let repository = open_current()?;
            print!("{}", repository.cat_file(&sha)?.display());
        }
        Commands::Serve { bind, token, path } => {
            let path = path.map_or_else(std::env::current_dir, Ok)?;
            let server = Server::bind(ServerConfig { bind, token, path }).await?;
            eprintln!("Listening on {}", server.local_addr()?);
            server.serve().await?;
        }
    }

    Ok(())
}

fn open_current() -> Result<Repository> {
    let pwd = std::env::current_dir()?;
    Repository::open(&pwd).with_context(|| format!("cannot open a repository at {}", pwd.display()))
}

fn sync_options(token: Option<String>) -> SyncOptions {
    SyncOptions {
        credential: token.map(Credential::Token),
        ..SyncOptions::default()
    }
}

/// `/srv/project` → `project`, `gitdist://host:9418` → `host`
fn default_clone_dir(url: &str) -> Result<PathBuf> {
    let name = match RemoteUrl::parse(url)? {
        RemoteUrl::Local(path) => path.file_name().map(|name| name.to_string_lossy().to_string()),
        RemoteUrl::Tcp { host, .. } => Some(host),
    };

    name.filter(|name| !name.is_empty())
        .map(PathBuf::from)
        .with_context(|| format!("cannot derive a directory name from {url}, pass one explicitly"))
}

fn print_fetch(outcome: &FetchOutcome) {
    if outcome.is_up_to_date() {
        println!("Already up to date");
        return;
    }
    for (branch, tip) in &outcome.updated {
        println!("{} -> {} {}", branch, tip.to_short_oid(), "updated".green());
    }
    println!("Received {} objects", outcome.received);
}

fn print_merge(outcome: &MergeOutcome) {
    match outcome {
        MergeOutcome::UpToDate => println!("Already up to date"),
        MergeOutcome::FastForward(oid) => println!("Fast-forward to {}", oid.to_short_oid()),
        MergeOutcome::Merged(oid) => println!("Merge made: {}", oid.to_short_oid()),
    }
}
