//! Porcelain commands
//!
//! - `init`: create an empty repository
//! - `clone`: copy a remote repository and check out its default branch
//! - `commit`: snapshot working-directory changes
//! - `status`: working-directory changes against the branch tip
//! - `log`: history of the active branch
//! - `fetch`: update remote-tracking branches
//! - `merge`: integrate the remote-tracking branch
//! - `pull`: fetch then merge
//! - `push`: publish the active branch

pub mod clone;
pub mod commit;
pub mod fetch;
pub mod init;
pub mod log;
pub mod merge;
pub mod pull;
pub mod push;
pub mod status;
