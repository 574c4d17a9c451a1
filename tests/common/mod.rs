#![allow(dead_code)]

use gitdist::{Author, InitOptions, ObjectId, Repository};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const AUTHOR_NAME: &str = "Ada Lovelace";
pub const AUTHOR_EMAIL: &str = "ada@example.com";

pub fn author() -> Author {
    Author::new(AUTHOR_NAME, AUTHOR_EMAIL)
}

pub fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(&path, content).expect("Failed to write file");
    path
}

pub fn read_file(root: &Path, relative: &str) -> String {
    std::fs::read_to_string(root.join(relative)).expect("Failed to read file")
}

pub fn init(path: &Path) -> Repository {
    Repository::init(path, InitOptions::default()).expect("Failed to init repository")
}

pub fn init_bare(path: &Path) -> Repository {
    let options = InitOptions {
        bare: true,
        ..InitOptions::default()
    };
    Repository::init(path, options).expect("Failed to init bare repository")
}

/// Commit every change in the working directory.
pub fn commit_all(repository: &mut Repository, message: &str) -> ObjectId {
    repository
        .commit_as(&[], message, author())
        .expect("Failed to commit")
}

/// A bare repository at `remote` whose `master` holds one commit with
/// `a.txt` and `dir/b.txt`, pushed from a scratch clone at `seed`.
pub async fn seeded_remote(remote: &Path, seed: &Path) -> ObjectId {
    init_bare(remote).free();

    let mut repository = init(seed);
    write_file(seed, "a.txt", "alpha\n");
    write_file(seed, "dir/b.txt", "beta\n");
    let oid = commit_all(&mut repository, "seed");
    repository
        .set_remote(remote.display().to_string())
        .expect("Failed to set remote");
    repository.push().await.expect("Failed to push seed");
    repository.free();

    oid
}

pub async fn clone(remote: &Path, path: &Path) -> Repository {
    let mut repository = Repository::clone(&remote.display().to_string(), path, Default::default())
        .await
        .expect("Failed to clone");
    repository
        .set_author(AUTHOR_NAME, AUTHOR_EMAIL)
        .expect("Failed to set author");
    repository
}

/// Every file of the repository directory at `root`, by path, with its bytes.
pub fn repository_snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root.join(".git"))
        .into_iter()
        .map(|entry| entry.expect("Failed to walk repository"))
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let content = std::fs::read(entry.path()).expect("Failed to read repository file");
            (entry.into_path(), content)
        })
        .collect()
}
