//! Hashing, request signing and the shared-secret envelope.
//!
//! Encrypted secrets have the form `hex(nonce):hex(ciphertext || tag)`,
//! sealed with AES-256-GCM under `SHA-256(encryption secret)`.

use aws_lc_rs::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use aws_lc_rs::rand::{SecureRandom, SystemRandom};
use aws_lc_rs::{digest, hmac};
use secrecy::{ExposeSecret, SecretString};

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
	#[error("malformed encrypted secret")]
	Malformed,
	#[error("failed to decrypt secret")]
	Decrypt,
	#[error("failed to encrypt secret")]
	Encrypt,
	#[error("no encryption secret configured")]
	MissingKey,
}

pub fn sha256_hex(data: &[u8]) -> String {
	hex::encode(digest::digest(&digest::SHA256, data).as_ref())
}

/// Hex HMAC-SHA256 of `body`.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
	let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
	hex::encode(hmac::sign(&key, body).as_ref())
}

pub struct SecretCipher {
	key: LessSafeKey,
}

impl std::fmt::Debug for SecretCipher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SecretCipher").finish_non_exhaustive()
	}
}

impl SecretCipher {
	pub fn new(encryption_secret: &SecretString) -> Result<Self, CryptoError> {
		let derived = digest::digest(
			&digest::SHA256,
			encryption_secret.expose_secret().as_bytes(),
		);
		let unbound = UnboundKey::new(&AES_256_GCM, derived.as_ref()).map_err(|_| CryptoError::Encrypt)?;
		Ok(Self {
			key: LessSafeKey::new(unbound),
		})
	}

	pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
		let mut nonce = [0u8; NONCE_LEN];
		SystemRandom::new()
			.fill(&mut nonce)
			.map_err(|_| CryptoError::Encrypt)?;
		let mut in_out = plaintext.as_bytes().to_vec();
		self
			.key
			.seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out)
			.map_err(|_| CryptoError::Encrypt)?;
		Ok(format!("{}:{}", hex::encode(nonce), hex::encode(in_out)))
	}

	pub fn decrypt(&self, encrypted: &str) -> Result<SecretString, CryptoError> {
		let (nonce, sealed) = encrypted.split_once(':').ok_or(CryptoError::Malformed)?;
		let nonce: [u8; NONCE_LEN] = hex::decode(nonce)
			.map_err(|_| CryptoError::Malformed)?
			.try_into()
			.map_err(|_| CryptoError::Malformed)?;
		let mut in_out = hex::decode(sealed).map_err(|_| CryptoError::Malformed)?;
		let plaintext = self
			.key
			.open_in_place(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out)
			.map_err(|_| CryptoError::Decrypt)?;
		let plaintext = std::str::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)?;
		Ok(SecretString::from(plaintext))
	}
}
