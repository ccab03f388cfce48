use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use openssl::ssl::{
    HandshakeError, Ssl, SslContextBuilder, SslMethod, SslStream, SslVerifyMode,
};

use crate::dtls::certificate::{DtlsIdentity, RemoteFingerprint};
use crate::dtls::datagram_channel::DatagramChannel;
use crate::dtls::dtls_error::DtlsError;
use crate::dtls::dtls_role::DtlsRole;
use crate::log::log_sink::LogSink;
use crate::srtp::{SrtpEndpointKeys, SrtpProfile, SrtpSessionConfig};
use crate::{sink_debug, sink_error, sink_info, sink_warn};

/// RFC 5705 exporter label for DTLS-SRTP (RFC 5764 §4.2).
const EXPORTER_LABEL: &str = "EXTRACTOR-dtls_srtp";
const SRTP_KEY_LEN: usize = 16;
const SRTP_SALT_LEN: usize = 14;

/// Runs the DTLS handshake over `channel` and exports the SRTP session
/// keys. The returned stream stays alive so the caller can keep watching
/// for a close_notify from the peer.
///
/// The remote certificate is accepted iff it hashes to
/// `expected_fingerprint`; chain building is deliberately not attempted
/// (WebRTC certificates are self-signed).
///
/// # Errors
/// [`DtlsError::HandshakeTimeout`] once `timeout` elapses without a
/// completed handshake, [`DtlsError::FingerprintMismatch`] /
/// [`DtlsError::CertificateInvalid`] from certificate pinning, or the
/// underlying openssl failure.
pub fn run_dtls_handshake(
    mut channel: DatagramChannel,
    role: DtlsRole,
    identity: &DtlsIdentity,
    expected_fingerprint: RemoteFingerprint,
    timeout: Duration,
    logger: Arc<dyn LogSink>,
) -> Result<(SrtpSessionConfig, SslStream<DatagramChannel>), DtlsError> {
    channel.set_read_timeout(timeout);

    sink_info!(
        &logger,
        "[DTLS] starting handshake as {} (pinned {} {})",
        role,
        expected_fingerprint.algorithm,
        expected_fingerprint.value
    );

    let mismatch = Arc::new(AtomicBool::new(false));
    let no_cert = Arc::new(AtomicBool::new(false));
    let builder = build_context(
        identity,
        expected_fingerprint,
        Arc::clone(&mismatch),
        Arc::clone(&no_cert),
        logger.clone(),
    )?;

    let ssl = Ssl::new(&builder.build())
        .map_err(|e| DtlsError::Ssl(format!("Ssl::new failed: {e}")))?;

    let result = match role {
        DtlsRole::Client => ssl.connect(channel),
        DtlsRole::Server => ssl.accept(channel),
    };

    let stream = match result {
        Ok(s) => s,
        Err(he) => {
            if mismatch.load(Ordering::Acquire) {
                sink_error!(&logger, "[DTLS] aborted: fingerprint mismatch");
                return Err(DtlsError::FingerprintMismatch);
            }
            if no_cert.load(Ordering::Acquire) {
                return Err(DtlsError::CertificateInvalid);
            }
            return Err(classify_handshake_error(he));
        }
    };

    let cfg = derive_srtp_keys(&stream, role, &logger)?;
    sink_info!(&logger, "[DTLS] handshake complete, SRTP keys derived");
    Ok((cfg, stream))
}

fn build_context(
    identity: &DtlsIdentity,
    expected: RemoteFingerprint,
    mismatch: Arc<AtomicBool>,
    no_cert: Arc<AtomicBool>,
    logger: Arc<dyn LogSink>,
) -> Result<SslContextBuilder, DtlsError> {
    let mut builder = SslContextBuilder::new(SslMethod::dtls())?;

    builder
        .set_tlsext_use_srtp("SRTP_AES128_CM_SHA1_80")
        .map_err(|e| DtlsError::Ssl(format!("set_tlsext_use_srtp failed: {e}")))?;

    builder.set_certificate(identity.certificate())?;
    builder.set_private_key(identity.private_key())?;
    builder.check_private_key()?;

    // Verification is fingerprint pinning only: the chain check result is
    // ignored, the digest comparison decides.
    builder.set_verify_callback(
        SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT,
        move |_preverify_ok, ctx| {
            let Some(cert) = ctx.current_cert() else {
                sink_warn!(logger, "[DTLS] verify: peer presented no certificate");
                no_cert.store(true, Ordering::Release);
                return false;
            };
            if expected.matches(&cert.to_owned()) {
                sink_debug!(logger, "[DTLS] verify: fingerprint matched");
                true
            } else {
                sink_warn!(
                    logger,
                    "[DTLS] verify: fingerprint mismatch (expected {} {})",
                    expected.algorithm,
                    expected.value
                );
                mismatch.store(true, Ordering::Release);
                false
            }
        },
    );

    Ok(builder)
}

fn classify_handshake_error(he: HandshakeError<DatagramChannel>) -> DtlsError {
    match he {
        // Our channel only reports WouldBlock when its deadline expired.
        HandshakeError::WouldBlock(_) => DtlsError::HandshakeTimeout,
        HandshakeError::Failure(mid) => {
            let err = mid.into_error();
            match err.io_error() {
                Some(io) if io.kind() == std::io::ErrorKind::WouldBlock => {
                    DtlsError::HandshakeTimeout
                }
                _ => {
                    let text = format!("{err}");
                    if text.contains("alert") {
                        DtlsError::PeerAlert(text)
                    } else {
                        DtlsError::Handshake(text)
                    }
                }
            }
        }
        HandshakeError::SetupFailure(e) => DtlsError::Ssl(format!("{e}")),
    }
}

fn derive_srtp_keys(
    stream: &SslStream<DatagramChannel>,
    role: DtlsRole,
    logger: &Arc<dyn LogSink>,
) -> Result<SrtpSessionConfig, DtlsError> {
    let selected = stream
        .ssl()
        .selected_srtp_profile()
        .ok_or(DtlsError::NoSrtpProfile)?;

    let profile = match selected.name() {
        "SRTP_AES128_CM_SHA1_80" => SrtpProfile::Aes128CmHmacSha1_80,
        other => {
            sink_warn!(logger, "[DTLS] unexpected SRTP profile selected: {}", other);
            return Err(DtlsError::NoSrtpProfile);
        }
    };

    // 60 bytes: client key, server key, client salt, server salt.
    let total_len = 2 * (SRTP_KEY_LEN + SRTP_SALT_LEN);
    let mut key_mat = vec![0u8; total_len];
    stream
        .ssl()
        .export_keying_material(&mut key_mat, EXPORTER_LABEL, None)
        .map_err(|e| DtlsError::KeyExport(format!("{e}")))?;

    sink_debug!(
        logger,
        "[DTLS] exported {} bytes of keying material",
        total_len
    );

    let (client_key, rest) = key_mat.split_at(SRTP_KEY_LEN);
    let (server_key, rest) = rest.split_at(SRTP_KEY_LEN);
    let (client_salt, server_salt) = rest.split_at(SRTP_SALT_LEN);

    let client_keys = SrtpEndpointKeys {
        master_key: client_key.to_vec(),
        master_salt: client_salt.to_vec(),
    };
    let server_keys = SrtpEndpointKeys {
        master_key: server_key.to_vec(),
        master_salt: server_salt.to_vec(),
    };

    // Our writes are encrypted with our role's key; the peer's with theirs.
    let (outbound, inbound) = match role {
        DtlsRole::Client => (client_keys, server_keys),
        DtlsRole::Server => (server_keys, client_keys),
    };

    key_mat.fill(0);

    Ok(SrtpSessionConfig {
        profile,
        outbound,
        inbound,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use std::net::UdpSocket;
    use std::sync::mpsc::channel;
    use std::thread;

    /// Wires two DatagramChannels back-to-back over loopback sockets, with
    /// forwarder threads playing the role of the ICE demux.
    fn loopback_channels() -> (DatagramChannel, DatagramChannel) {
        let sock_a = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        let sock_b = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        let addr_a = sock_a.local_addr().unwrap();
        let addr_b = sock_b.local_addr().unwrap();

        let (tx_a, rx_a) = channel();
        let (tx_b, rx_b) = channel();

        for (sock, tx) in [(Arc::clone(&sock_a), tx_a), (Arc::clone(&sock_b), tx_b)] {
            thread::spawn(move || {
                let mut buf = [0u8; 2048];
                while let Ok((n, _)) = sock.recv_from(&mut buf) {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            });
        }

        let logger: Arc<dyn LogSink> = Arc::new(NoopLogSink);
        let ch_a = DatagramChannel::new(
            rx_a,
            Arc::clone(&sock_a),
            addr_b,
            Duration::from_secs(5),
            logger.clone(),
        );
        let ch_b = DatagramChannel::new(rx_b, sock_b, addr_a, Duration::from_secs(5), logger);
        (ch_a, ch_b)
    }

    #[test]
    fn loopback_handshake_exports_mirrored_keys() {
        let client_id = DtlsIdentity::generate().unwrap();
        let server_id = DtlsIdentity::generate().unwrap();
        let client_fp =
            RemoteFingerprint::parse(&format!("sha-256 {}", server_id.fingerprint())).unwrap();
        let server_fp =
            RemoteFingerprint::parse(&format!("sha-256 {}", client_id.fingerprint())).unwrap();

        let (ch_client, ch_server) = loopback_channels();

        let server = thread::spawn(move || {
            run_dtls_handshake(
                ch_server,
                DtlsRole::Server,
                &server_id,
                server_fp,
                Duration::from_secs(10),
                Arc::new(NoopLogSink),
            )
        });

        let (client_cfg, _client_stream) = run_dtls_handshake(
            ch_client,
            DtlsRole::Client,
            &client_id,
            client_fp,
            Duration::from_secs(10),
            Arc::new(NoopLogSink),
        )
        .unwrap();

        let (server_cfg, _server_stream) = server.join().unwrap().unwrap();

        // The client's outbound keys are the server's inbound keys and
        // vice versa.
        assert_eq!(
            client_cfg.outbound.master_key,
            server_cfg.inbound.master_key
        );
        assert_eq!(
            client_cfg.inbound.master_salt,
            server_cfg.outbound.master_salt
        );
        assert_eq!(client_cfg.profile, SrtpProfile::Aes128CmHmacSha1_80);
    }

    #[test]
    fn wrong_fingerprint_fails_as_mismatch() {
        let client_id = DtlsIdentity::generate().unwrap();
        let server_id = DtlsIdentity::generate().unwrap();
        let unrelated = DtlsIdentity::generate().unwrap();

        // Client pins a fingerprint the server will not match.
        let client_fp =
            RemoteFingerprint::parse(&format!("sha-256 {}", unrelated.fingerprint())).unwrap();
        let server_fp =
            RemoteFingerprint::parse(&format!("sha-256 {}", client_id.fingerprint())).unwrap();

        let (ch_client, ch_server) = loopback_channels();

        let server = thread::spawn(move || {
            run_dtls_handshake(
                ch_server,
                DtlsRole::Server,
                &server_id,
                server_fp,
                Duration::from_secs(5),
                Arc::new(NoopLogSink),
            )
        });

        let client_result = run_dtls_handshake(
            ch_client,
            DtlsRole::Client,
            &client_id,
            client_fp,
            Duration::from_secs(5),
            Arc::new(NoopLogSink),
        );
        assert!(matches!(
            client_result,
            Err(DtlsError::FingerprintMismatch)
        ));
        // The server side fails too (either alert or its own error); we
        // only require that it terminates.
        let _ = server.join().unwrap();
    }

    #[test]
    fn silence_times_out() {
        let id = DtlsIdentity::generate().unwrap();
        let fp = RemoteFingerprint::parse(&format!("sha-256 {}", id.fingerprint())).unwrap();
        let (mut ch, _other) = loopback_channels();
        ch.set_read_timeout(Duration::from_millis(100));
        // Server role waits for a ClientHello that never comes.
        let result = run_dtls_handshake(
            ch,
            DtlsRole::Server,
            &id,
            fp,
            Duration::from_millis(100),
            Arc::new(NoopLogSink),
        );
        assert!(matches!(result, Err(DtlsError::HandshakeTimeout)));
    }
}
