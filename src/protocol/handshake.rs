//! Node authentication handshake using Elliptic Curve Diffie-Hellman (x25519)
//!
//! The load-balancer link authenticates the *node*, not an end user, with a
//! fixed service credential pair. The client sends its public ephemeral value,
//! the load balancer answers with a salt and its own public value, and both
//! sides prove knowledge of a key derived from the ECDH shared secret and the
//! salted password.
//!
//! The cryptographic collaborator is abstracted behind [`Authenticator`] so a
//! different scheme (e.g. SRP6) can be plugged in without touching the
//! dispatch or session layers. [`KeyExchangeAuthenticator`] is the client
//! implementation shipped with the crate and [`KeyExchangeVerifier`] the
//! matching load-balancer side.

use bytes::{BufMut, BytesMut};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, instrument, warn};
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroizing;

use crate::core::packet::{Opcode, PayloadReader, MAX_PAYLOAD_SIZE};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::ConnectionStatus;
use crate::service::Connection;
use crate::utils::metrics::global_metrics;

/// Length of every public value, salt, proof and key in this scheme.
pub const KEY_SIZE: usize = 32;

/// Payload size of `SMSG_LOGON_CHALLENGE`: salt followed by the server public value.
pub const SERVER_CHALLENGE_SIZE: usize = KEY_SIZE * 2;

/// Service credential pair presented by this node.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new("loadbalancer", "password")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Client side of the challenge/response exchange.
pub trait Authenticator: Send {
    /// Generates the client public ephemeral value.
    ///
    /// Failure aborts the connect attempt before anything is sent.
    fn start(&mut self, username: &str, password: &str) -> Result<Vec<u8>>;

    /// Consumes the server challenge and returns the client proof.
    fn respond(&mut self, salt: &[u8], server_public: &[u8]) -> Result<Vec<u8>>;

    /// Checks the server proof; on success the session key is available.
    fn verify(&mut self, server_proof: &[u8]) -> Result<()>;

    fn session_key(&self) -> Option<&[u8]>;
}

fn password_key(salt: &[u8], username: &str, password: &str) -> [u8; KEY_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(username.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

fn derive_session_key(shared_secret: &[u8], password_key: &[u8]) -> [u8; KEY_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(shared_secret);
    hasher.update(password_key);
    hasher.finalize().into()
}

fn client_proof(
    username: &str,
    salt: &[u8],
    client_public: &[u8],
    server_public: &[u8],
    session_key: &[u8],
) -> [u8; KEY_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(b"client_proof");
    hasher.update(username.as_bytes());
    hasher.update(salt);
    hasher.update(client_public);
    hasher.update(server_public);
    hasher.update(session_key);
    hasher.finalize().into()
}

fn server_proof(client_public: &[u8], client_proof: &[u8], session_key: &[u8]) -> [u8; KEY_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(b"server_proof");
    hasher.update(client_public);
    hasher.update(client_proof);
    hasher.update(session_key);
    hasher.finalize().into()
}

fn public_key(bytes: &[u8]) -> Result<PublicKey> {
    let raw: [u8; KEY_SIZE] = bytes
        .try_into()
        .map_err(|_| ProtocolError::HandshakeError(constants::ERR_INVALID_PUBLIC_VALUE.into()))?;
    Ok(PublicKey::from(raw))
}

/// x25519 client authenticator.
#[derive(Default)]
pub struct KeyExchangeAuthenticator {
    secret: Option<EphemeralSecret>,
    username: String,
    password: Zeroizing<String>,
    client_public: Option<[u8; KEY_SIZE]>,
    client_proof: Option<[u8; KEY_SIZE]>,
    session_key: Option<Zeroizing<[u8; KEY_SIZE]>>,
    verified: bool,
}

impl KeyExchangeAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Authenticator for KeyExchangeAuthenticator {
    fn start(&mut self, username: &str, password: &str) -> Result<Vec<u8>> {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);

        *self = Self {
            secret: Some(secret),
            username: username.to_string(),
            password: Zeroizing::new(password.to_string()),
            client_public: Some(public.to_bytes()),
            ..Self::default()
        };

        Ok(public.to_bytes().to_vec())
    }

    fn respond(&mut self, salt: &[u8], server_public: &[u8]) -> Result<Vec<u8>> {
        let secret = self.secret.take().ok_or_else(|| {
            ProtocolError::HandshakeError(constants::ERR_HANDSHAKE_NOT_STARTED.into())
        })?;
        let client_public = self.client_public.ok_or_else(|| {
            ProtocolError::HandshakeError(constants::ERR_HANDSHAKE_NOT_STARTED.into())
        })?;

        let shared_secret = secret.diffie_hellman(&public_key(server_public)?);
        if !shared_secret.was_contributory() {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_INVALID_PUBLIC_VALUE.into(),
            ));
        }

        let password_key = Zeroizing::new(password_key(salt, &self.username, &self.password));
        let key = Zeroizing::new(derive_session_key(shared_secret.as_bytes(), &*password_key));
        let proof = client_proof(&self.username, salt, &client_public, server_public, &*key);

        self.session_key = Some(key);
        self.client_proof = Some(proof);

        Ok(proof.to_vec())
    }

    fn verify(&mut self, server_proof_bytes: &[u8]) -> Result<()> {
        let (Some(client_public), Some(proof), Some(key)) =
            (self.client_public, self.client_proof, self.session_key.as_ref())
        else {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_SERVER_CHALLENGE_MISSING.into(),
            ));
        };

        let expected = server_proof(&client_public, &proof, &**key);
        if expected.as_slice() != server_proof_bytes {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_SERVER_PROOF_MISMATCH.into(),
            ));
        }

        self.verified = true;
        Ok(())
    }

    fn session_key(&self) -> Option<&[u8]> {
        if !self.verified {
            return None;
        }
        self.session_key.as_ref().map(|key| key.as_slice())
    }
}

struct Account {
    salt: [u8; KEY_SIZE],
    password_key: Zeroizing<[u8; KEY_SIZE]>,
}

struct PendingLogon {
    username: String,
    salt: [u8; KEY_SIZE],
    client_public: [u8; KEY_SIZE],
    server_public: [u8; KEY_SIZE],
    session_key: Zeroizing<[u8; KEY_SIZE]>,
}

/// Load-balancer side of the exchange.
///
/// Holds salted password keys per account and the state of one in-flight logon.
#[derive(Default)]
pub struct KeyExchangeVerifier {
    accounts: HashMap<String, Account>,
    pending: Option<PendingLogon>,
    session_key: Option<Zeroizing<[u8; KEY_SIZE]>>,
}

impl KeyExchangeVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account under a freshly generated salt.
    pub fn add_account(&mut self, username: &str, password: &str) -> Result<()> {
        let mut salt = [0u8; KEY_SIZE];
        getrandom::fill(&mut salt)
            .map_err(|e| ProtocolError::HandshakeError(format!("{}: {e}", constants::ERR_SALT_GENERATION)))?;

        self.accounts.insert(
            username.to_string(),
            Account {
                salt,
                password_key: Zeroizing::new(password_key(&salt, username, password)),
            },
        );
        Ok(())
    }

    /// Answers a `CMSG_LOGON_CHALLENGE` payload with `salt || B`.
    #[instrument(skip(self, request))]
    pub fn challenge(&mut self, request: &[u8]) -> Result<[u8; SERVER_CHALLENGE_SIZE]> {
        let mut reader = PayloadReader::new(request);
        let username = reader
            .read_cstr()
            .map_err(|_| ProtocolError::HandshakeError(constants::ERR_MISSING_USERNAME.into()))?;
        let client_public = public_key(reader.rest())?;

        let account = self
            .accounts
            .get(username)
            .ok_or_else(|| ProtocolError::HandshakeError(constants::ERR_UNKNOWN_ACCOUNT.into()))?;

        let secret = EphemeralSecret::random_from_rng(OsRng);
        let server_public = PublicKey::from(&secret);
        let shared_secret = secret.diffie_hellman(&client_public);
        if !shared_secret.was_contributory() {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_INVALID_PUBLIC_VALUE.into(),
            ));
        }

        let session_key = Zeroizing::new(derive_session_key(
            shared_secret.as_bytes(),
            &*account.password_key,
        ));

        let mut response = [0u8; SERVER_CHALLENGE_SIZE];
        response[..KEY_SIZE].copy_from_slice(&account.salt);
        response[KEY_SIZE..].copy_from_slice(server_public.as_bytes());

        self.pending = Some(PendingLogon {
            username: username.to_string(),
            salt: account.salt,
            client_public: client_public.to_bytes(),
            server_public: server_public.to_bytes(),
            session_key,
        });

        debug!(username, "Issued logon challenge");
        Ok(response)
    }

    /// Checks the client proof and returns the server proof.
    #[instrument(skip(self, proof))]
    pub fn verify_proof(&mut self, proof: &[u8]) -> Result<[u8; KEY_SIZE]> {
        let pending = self.pending.take().ok_or_else(|| {
            ProtocolError::HandshakeError(constants::ERR_HANDSHAKE_NOT_STARTED.into())
        })?;

        let expected = client_proof(
            &pending.username,
            &pending.salt,
            &pending.client_public,
            &pending.server_public,
            &*pending.session_key,
        );
        if expected.as_slice() != proof {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_CLIENT_PROOF_MISMATCH.into(),
            ));
        }

        let response = server_proof(&pending.client_public, &expected, &*pending.session_key);
        self.session_key = Some(pending.session_key);
        Ok(response)
    }

    pub fn session_key(&self) -> Option<&[u8]> {
        self.session_key.as_ref().map(|key| key.as_slice())
    }
}

/// Serializes a `CMSG_LOGON_CHALLENGE` packet.
///
/// The size field is written as a placeholder and patched once the
/// variable-length body is known.
pub fn write_challenge_request(username: &str, client_public: &[u8]) -> Result<BytesMut> {
    if username.as_bytes().contains(&0) {
        return Err(ProtocolError::HandshakeError(
            constants::ERR_MISSING_USERNAME.into(),
        ));
    }

    let mut buffer = BytesMut::with_capacity(512);
    buffer.put_u16_le(Opcode::ClientLogonChallenge.as_u16());
    buffer.put_u16_le(0);

    let body_start = buffer.len();
    buffer.put_slice(username.as_bytes());
    buffer.put_u8(0);
    buffer.put_slice(client_public);

    let size = buffer.len() - body_start;
    if size > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::OversizedPacket(size));
    }
    buffer[2..4].copy_from_slice(&(size as u16).to_le_bytes());

    Ok(buffer)
}

/// Kicks off authentication on a freshly connected link.
///
/// If the ephemeral value cannot be generated nothing is sent and the
/// connection stays `NotConnected`.
#[instrument(skip(connection))]
pub fn start_handshake(connection: &mut Connection) -> Result<()> {
    global_metrics().handshake_attempt();

    let client_public = match connection.start_authentication() {
        Ok(public) => public,
        Err(e) => {
            warn!(error = %e, "{}", constants::ERR_EPHEMERAL_GENERATION);
            global_metrics().handshake_failed();
            return Err(e);
        }
    };

    let request = write_challenge_request(&connection.credentials().username, &client_public)?;
    connection.send_bytes(&request)?;
    connection.set_status(ConnectionStatus::AuthChallenge);

    info!(username = %connection.credentials().username, "Sent logon challenge");
    Ok(())
}
