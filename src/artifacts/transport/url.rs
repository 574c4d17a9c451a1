use crate::errors::{Result, VcsError};
use std::path::PathBuf;

pub const TCP_SCHEME: &str = "gitdist://";
pub const FILE_SCHEME: &str = "file://";
pub const DEFAULT_PORT: u16 = 9418;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteUrl {
    Local(PathBuf),
    Tcp { host: String, port: u16 },
}

impl RemoteUrl {
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(VcsError::InvalidArgument("empty remote url".into()));
        }

        if let Some(path) = url.strip_prefix(FILE_SCHEME) {
            return Ok(RemoteUrl::Local(PathBuf::from(path)));
        }

        if let Some(address) = url.strip_prefix(TCP_SCHEME) {
            return Self::parse_address(address.trim_end_matches('/'));
        }

        // scp-like `user@host:path` and every other scheme
        if url.contains("://") || Self::looks_like_scp(url) {
            return Err(VcsError::Network(format!("unsupported transport: {url}")));
        }

        Ok(RemoteUrl::Local(PathBuf::from(url)))
    }

    fn looks_like_scp(url: &str) -> bool {
        match (url.find('@'), url.find(':')) {
            (Some(at), Some(colon)) => at < colon && !url[..at].contains('/'),
            _ => false,
        }
    }

    fn parse_address(address: &str) -> Result<Self> {
        let invalid = || VcsError::InvalidArgument(format!("invalid address: {address}"));

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (address, DEFAULT_PORT),
        };
        if host.is_empty() || host.contains('/') {
            return Err(invalid());
        }

        Ok(RemoteUrl::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("/srv/repo", RemoteUrl::Local(PathBuf::from("/srv/repo")))]
    #[case("../repo", RemoteUrl::Local(PathBuf::from("../repo")))]
    #[case("file:///srv/repo", RemoteUrl::Local(PathBuf::from("/srv/repo")))]
    #[case("gitdist://localhost:7000", RemoteUrl::Tcp { host: "localhost".into(), port: 7000 })]
    #[case("gitdist://example.com", RemoteUrl::Tcp { host: "example.com".into(), port: DEFAULT_PORT })]
    fn parses_supported_urls(#[case] url: &str, #[case] expected: RemoteUrl) {
        assert_eq!(RemoteUrl::parse(url).unwrap(), expected);
    }

    #[rstest]
    #[case("https://github.com/user/repo.git")]
    #[case("ssh://git@host/repo")]
    #[case("git@github.com:user/repo.git")]
    fn other_transports_are_network_errors(#[case] url: &str) {
        let error = RemoteUrl::parse(url).unwrap_err();
        assert!(matches!(error, VcsError::Network(ref message) if message.contains("unsupported transport")));
    }

    #[test]
    fn rejects_bad_ports() {
        assert!(matches!(
            RemoteUrl::parse("gitdist://host:notaport"),
            Err(VcsError::InvalidArgument(_))
        ));
    }
}
