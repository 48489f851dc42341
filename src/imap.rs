//! IMAP message source for the ingestion job
//!
//! Every call opens a fresh session: connect (implicit TLS or STARTTLS),
//! log in, SELECT the configured folder, do the work, log out. Fetched
//! messages are consumed by flagging them `\Deleted` and expunging.

use crate::config::{ImapConfig, ImapSecurity};
use crate::error::{Error, Result};
use crate::ingest::{InboundMessage, MessageSource};
use async_imap::Session;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mail_parser::{HeaderName, MessageParser};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info, warn};

/// A TLS-wrapped IMAP session.
pub type ImapSession = Session<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;

/// Pulls new mail out of an IMAP folder.
pub struct ImapSource {
    config: ImapConfig,
}

impl ImapSource {
    #[must_use]
    pub const fn new(config: ImapConfig) -> Self {
        Self { config }
    }

    async fn open(&self) -> Result<ImapSession> {
        let mut session = connect(&self.config).await?;
        session
            .select(&self.config.folder)
            .await
            .map_err(|e| Error::Imap(format!("Failed to select {}: {e}", self.config.folder)))?;
        Ok(session)
    }
}

#[async_trait]
impl MessageSource for ImapSource {
    async fn fetch_new_messages(&mut self) -> Result<Vec<InboundMessage>> {
        let mut session = self.open().await?;

        let uids = session
            .uid_search("ALL")
            .await
            .map_err(|e| Error::Imap(format!("Search failed: {e}")))?;
        let mut uid_list: Vec<u32> = uids.into_iter().collect();
        uid_list.sort_unstable();

        if uid_list.is_empty() {
            debug!("No messages found");
            session.logout().await.ok();
            return Ok(Vec::new());
        }

        info!("Fetching {} message(s) from {}", uid_list.len(), self.config.folder);

        let mut messages = Vec::with_capacity(uid_list.len());
        for uid in uid_list {
            match fetch_single(&mut session, uid).await {
                Ok(message) => messages.push(message),
                // Left in the folder; the next poll retries it.
                Err(e) => warn!("Failed to fetch UID {}: {}", uid, e),
            }
        }

        session.logout().await.ok();
        Ok(messages)
    }

    async fn mark_consumed(&mut self, uids: &[u32]) -> Result<()> {
        if uids.is_empty() {
            return Ok(());
        }
        let mut session = self.open().await?;
        let uid_set = uids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");

        session
            .uid_store(&uid_set, "+FLAGS.SILENT (\\Deleted)")
            .await
            .map_err(|e| Error::Imap(format!("Store failed: {e}")))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| Error::Imap(format!("Store failed: {e}")))?;

        let expunged = session
            .expunge()
            .await
            .map_err(|e| Error::Imap(format!("Expunge failed: {e}")))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| Error::Imap(format!("Expunge failed: {e}")))?;
        debug!("Expunged {} message(s)", expunged.len());

        session.logout().await.ok();
        Ok(())
    }
}

/// Decode a raw RFC 5322 message into an [`InboundMessage`].
///
/// `to` keeps the header text as received; `body` is the first text
/// part, with HTML reduced to plain text.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the bytes are not a parseable message.
pub fn parse_message(uid: u32, raw: &[u8]) -> Result<InboundMessage> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| Error::Parse(format!("UID {uid} is not a valid message")))?;

    let from = message
        .from()
        .and_then(|a| a.first())
        .and_then(|a| a.address())
        .map(str::to_string)
        .or_else(|| message.header_raw(HeaderName::From).map(|v| v.trim().to_string()))
        .unwrap_or_default();

    Ok(InboundMessage {
        uid,
        from,
        to: message
            .header_raw(HeaderName::To)
            .map(|v| v.trim().to_string())
            .unwrap_or_default(),
        subject: message.subject().unwrap_or_default().to_string(),
        body: message
            .body_text(0)
            .map(|b| b.trim_end().to_string())
            .unwrap_or_default(),
    })
}

async fn fetch_single(session: &mut ImapSession, uid: u32) -> Result<InboundMessage> {
    let uid_set = format!("{uid}");
    let mut messages = session
        .uid_fetch(&uid_set, "(BODY.PEEK[])")
        .await
        .map_err(|e| Error::Imap(format!("Fetch failed: {e}")))?;

    if let Some(msg_result) = messages.next().await {
        let msg = msg_result.map_err(|e| Error::Imap(format!("Fetch error: {e}")))?;
        if let Some(body) = msg.body() {
            return parse_message(uid, body);
        }
    }

    Err(Error::Imap(format!("No body found for UID {uid}")))
}

/// Open a fresh TLS-wrapped IMAP session and log in.
async fn connect(config: &ImapConfig) -> Result<ImapSession> {
    let addr = format!("{}:{}", config.host, config.port);
    debug!("Connecting to IMAP server at {} ({:?})", addr, config.security);

    let mut tcp_stream = TcpStream::connect(&addr).await?;

    if config.security == ImapSecurity::StartTls {
        let mut client = async_imap::Client::new(tcp_stream.compat());
        client
            .run_command_and_check_ok("STARTTLS", None)
            .await
            .map_err(|e| Error::Tls(format!("STARTTLS failed: {e}")))?;
        tcp_stream = client.into_inner().into_inner();
    }

    let connector = tls_connector(config.accept_invalid_certs)?;
    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;
    let tls_stream = connector
        .connect(server_name, tcp_stream)
        .await
        .map_err(|e| Error::Tls(e.to_string()))?;

    let session = async_imap::Client::new(tls_stream.compat())
        .login(&config.username, &config.password)
        .await
        .map_err(|(e, _)| Error::Imap(format!("Login failed: {e}")))?;

    info!("Connected to IMAP server");
    Ok(session)
}

/// Build a TLS connector. Certificates are checked against the webpki
/// roots unless `accept_invalid_certs` is set.
fn tls_connector(accept_invalid_certs: bool) -> Result<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?;

    let config = if accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Accepts any server certificate (self-signed test servers) while
/// still checking handshake signatures.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
