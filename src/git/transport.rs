use git2::{
    cert::Cert, AutotagOption, CertificateCheckStatus, Config, Cred, CredentialType, FetchOptions,
    PushOptions, RemoteCallbacks,
};
use log::trace;
use ssh_key::{known_hosts::HostPatterns, KnownHosts};

const GLOBAL_KNOWN_HOSTS: &str = "/etc/ssh/ssh_known_hosts";

/// Options for fetching refs through the namespaces given explicitly in the refspecs.
pub fn fetch_options(git_config: &Config) -> FetchOptions<'_> {
    let mut fetch_options = FetchOptions::new();
    fetch_options
        .remote_callbacks(callbacks(git_config))
        .download_tags(AutotagOption::None);
    fetch_options
}

pub fn push_options(git_config: &Config) -> PushOptions<'_> {
    let mut push_options = PushOptions::new();
    push_options.remote_callbacks(callbacks(git_config));
    push_options
}

fn callbacks(git_config: &Config) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username, allowed_types| {
        trace!(
            "Requested credentials for {}, username {:?}, allowed types {:?}",
            url,
            username,
            allowed_types
        );
        if allowed_types.contains(CredentialType::USERNAME) {
            return Cred::username("git");
        }
        if allowed_types.contains(CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username.unwrap_or("git"));
        }
        if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
            return Cred::credential_helper(git_config, url, username);
        }
        Err(git2::Error::from_str("no valid authentication available"))
    });
    callbacks.certificate_check(check_certificate);
    callbacks
}

fn check_certificate(
    certificate: &Cert<'_>,
    host: &str,
) -> Result<CertificateCheckStatus, git2::Error> {
    if let Some(hostkey) = certificate.as_hostkey().and_then(|h| h.hostkey()) {
        trace!("Loading {}", GLOBAL_KNOWN_HOSTS);
        match KnownHosts::read_file(GLOBAL_KNOWN_HOSTS) {
            Ok(entries) => {
                let known = entries.iter().any(|entry| {
                    host_matches_patterns(host, entry.host_patterns())
                        && entry.public_key().to_bytes().as_deref() == Ok(hostkey)
                });
                if known {
                    trace!("Known host entry matches the host key of {}", host);
                    return Ok(CertificateCheckStatus::CertificateOk);
                }
                trace!("No known host entry matched the host key of {}", host);
            }
            Err(error) => trace!("Could not load {}: {}", GLOBAL_KNOWN_HOSTS, error),
        }
    }
    Ok(CertificateCheckStatus::CertificatePassthrough)
}

fn host_matches_patterns(host: &str, patterns: &HostPatterns) -> bool {
    match patterns {
        HostPatterns::Patterns(patterns) => {
            let host = host.to_lowercase();
            let mut match_found = false;
            for pattern in patterns {
                let pattern = pattern.to_lowercase();
                // * and ? wildcards are not supported
                if let Some(negated) = pattern.strip_prefix('!') {
                    if negated == host {
                        return false;
                    }
                } else {
                    match_found |= pattern == host;
                }
            }
            match_found
        }
        HostPatterns::HashedName { .. } => false,
    }
}
