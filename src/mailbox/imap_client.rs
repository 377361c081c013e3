//! IMAP over TLS.

use std::io::ErrorKind;
use std::net::TcpStream;

use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, info, warn};

use super::{FetchCriteria, Mailbox, MailboxError};
use crate::config::Credentials;

type ImapSession = imap::Session<TlsStream<TcpStream>>;

/// A mailbox reached over IMAPS. Each fetch uses a fresh session.
pub struct ImapMailbox {
    host: String,
    port: u16,
    user: String,
    password: String,
}

impl ImapMailbox {
    pub fn new(credentials: &Credentials, port: u16) -> Self {
        Self {
            host: credentials.imap_host.clone(),
            port,
            user: credentials.imap_user.clone(),
            password: credentials.imap_password.clone(),
        }
    }

    fn connect(&self) -> Result<ImapSession, MailboxError> {
        let tls = TlsConnector::builder().build()?;
        let client = imap::connect((self.host.as_str(), self.port), &self.host, &tls)
            .map_err(imap_error)?;
        let session = client
            .login(&self.user, &self.password)
            .map_err(|(err, _client)| imap_error(err))?;
        debug!(host = %self.host, user = %self.user, "IMAP login succeeded");
        Ok(session)
    }
}

impl Mailbox for ImapMailbox {
    fn fetch(
        &mut self,
        folder: &str,
        criteria: &FetchCriteria,
    ) -> Result<Vec<Vec<u8>>, MailboxError> {
        let mut session = self.connect()?;
        let result = fetch_from_session(&mut session, folder, criteria);
        if let Err(err) = session.logout() {
            debug!(error = %err, "IMAP logout failed");
        }
        result
    }
}

fn fetch_from_session(
    session: &mut ImapSession,
    folder: &str,
    criteria: &FetchCriteria,
) -> Result<Vec<Vec<u8>>, MailboxError> {
    session.select(folder).map_err(imap_error)?;

    let query = criteria.to_imap_query();
    let mut sequence: Vec<u32> = session
        .search(&query)
        .map_err(imap_error)?
        .into_iter()
        .collect();
    sequence.sort_unstable();
    info!(folder, query = %query, found = sequence.len(), "Searched mailbox");

    let mut messages = Vec::with_capacity(sequence.len());
    for seq in sequence {
        let fetches = session
            .fetch(seq.to_string(), "RFC822")
            .map_err(imap_error)?;
        match fetches.iter().find_map(|f| f.body()) {
            Some(body) => messages.push(body.to_vec()),
            None => warn!(seq, "Server returned no body for message"),
        }
    }
    Ok(messages)
}

fn imap_error(err: imap::Error) -> MailboxError {
    match err {
        imap::Error::ConnectionLost => MailboxError::ConnectionLost,
        imap::Error::Io(io)
            if matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::TimedOut
            ) =>
        {
            MailboxError::ConnectionLost
        }
        imap::Error::Tls(tls) => MailboxError::Tls(tls),
        other => MailboxError::Imap(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_resets_are_connection_lost() {
        let reset = imap::Error::Io(io::Error::new(ErrorKind::ConnectionReset, "reset"));
        assert!(matches!(imap_error(reset), MailboxError::ConnectionLost));
        assert!(matches!(
            imap_error(imap::Error::ConnectionLost),
            MailboxError::ConnectionLost
        ));
    }

    #[test]
    fn test_other_errors_are_reported() {
        let refused = imap::Error::Io(io::Error::new(ErrorKind::PermissionDenied, "nope"));
        assert!(matches!(imap_error(refused), MailboxError::Imap(_)));
        assert!(matches!(
            imap_error(imap::Error::No("bad folder".into())),
            MailboxError::Imap(_)
        ));
    }
}
