//! In-memory credential holder.
//!
//! Keys are kept in wipeable byte buffers and only rendered to plaintext
//! for the duration of a client construction.

use std::fmt;

use zeroize::{Zeroize, Zeroizing};

use crate::error::{Result, UploadError};

const MIN_CAPACITY: usize = 32;

/// Growable UTF-8 buffer that wipes every byte it releases.
#[derive(Default)]
pub struct SecretBuffer {
    bytes: Vec<u8>,
}

impl SecretBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a character, moving to a larger allocation when needed.
    pub fn push(&mut self, c: char) {
        let mut encoded = [0u8; 4];
        let encoded_len = c.encode_utf8(&mut encoded).len();
        self.reserve(encoded_len);
        self.bytes.extend_from_slice(&encoded[..encoded_len]);
        encoded.zeroize();
    }

    /// Appends every character of `s`.
    pub fn push_str(&mut self, s: &str) {
        self.reserve(s.len());
        self.bytes.extend_from_slice(s.as_bytes());
    }

    /// Removes the last character. Returns false when the buffer is empty.
    pub fn pop(&mut self) -> bool {
        let Some(last_len) = std::str::from_utf8(&self.bytes)
            .ok()
            .and_then(|s| s.chars().next_back())
            .map(char::len_utf8)
        else {
            return false;
        };

        let new_len = self.bytes.len() - last_len;
        self.bytes[new_len..].zeroize();
        self.bytes.truncate(new_len);
        true
    }

    /// Wipes the contents and keeps the buffer usable.
    pub fn clear(&mut self) {
        self.bytes.zeroize();
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of characters held.
    pub fn len(&self) -> usize {
        std::str::from_utf8(&self.bytes)
            .map(|s| s.chars().count())
            .unwrap_or(0)
    }

    /// Renders the contents as a self-wiping plaintext copy.
    pub fn expose(&self) -> Zeroizing<String> {
        Zeroizing::new(String::from_utf8_lossy(&self.bytes).into_owned())
    }

    fn reserve(&mut self, additional: usize) {
        if self.bytes.capacity() - self.bytes.len() >= additional {
            return;
        }

        let capacity = (self.bytes.capacity() * 2)
            .max(self.bytes.len() + additional)
            .max(MIN_CAPACITY);
        let mut grown = Vec::with_capacity(capacity);
        grown.extend_from_slice(&self.bytes);
        self.bytes.zeroize();
        self.bytes = grown;
    }
}

impl From<&str> for SecretBuffer {
    fn from(value: &str) -> Self {
        let mut buffer = Self::new();
        buffer.push_str(value);
        buffer
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(<redacted>)")
    }
}

/// Access and secret keys for the object store.
///
/// Neither key is ever logged or serialized. After [`dispose`](Self::dispose)
/// both buffers are wiped and every accessor fails with
/// [`UploadError::CredentialsDisposed`].
pub struct Credentials {
    access_key: SecretBuffer,
    secret_key: SecretBuffer,
    disposed: bool,
}

impl Credentials {
    /// Creates credentials from plaintext keys.
    pub fn new(access_key: &str, secret_key: &str) -> Result<Self> {
        if access_key.is_empty() {
            return Err(UploadError::invalid_argument(
                "access_key",
                "must not be empty",
            ));
        }
        if secret_key.is_empty() {
            return Err(UploadError::invalid_argument(
                "secret_key",
                "must not be empty",
            ));
        }

        Ok(Self {
            access_key: SecretBuffer::from(access_key),
            secret_key: SecretBuffer::from(secret_key),
            disposed: false,
        })
    }

    /// Creates empty credentials to be filled character by character.
    pub fn empty() -> Self {
        Self {
            access_key: SecretBuffer::new(),
            secret_key: SecretBuffer::new(),
            disposed: false,
        }
    }

    pub fn access_key_mut(&mut self) -> &mut SecretBuffer {
        &mut self.access_key
    }

    pub fn secret_key_mut(&mut self) -> &mut SecretBuffer {
        &mut self.secret_key
    }

    /// Plaintext access key, valid until the returned value drops.
    pub fn expose_access_key(&self) -> Result<Zeroizing<String>> {
        self.expose("access_key", &self.access_key)
    }

    /// Plaintext secret key, valid until the returned value drops.
    pub fn expose_secret_key(&self) -> Result<Zeroizing<String>> {
        self.expose("secret_key", &self.secret_key)
    }

    /// Wipes both keys. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.access_key.clear();
        self.secret_key.clear();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn expose(&self, name: &'static str, buffer: &SecretBuffer) -> Result<Zeroizing<String>> {
        if self.disposed {
            return Err(UploadError::CredentialsDisposed);
        }
        if buffer.is_empty() {
            return Err(UploadError::invalid_argument(name, "must not be empty"));
        }
        Ok(buffer.expose())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("disposed", &self.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_keys() {
        assert!(matches!(
            Credentials::new("", "secret"),
            Err(UploadError::InvalidArgument { name: "access_key", .. })
        ));
        assert!(matches!(
            Credentials::new("access", ""),
            Err(UploadError::InvalidArgument { name: "secret_key", .. })
        ));
    }

    #[test]
    fn test_expose_round_trip() {
        let creds = Credentials::new("DO00ACCESS", "s3cr3t/key").unwrap();
        assert_eq!(creds.expose_access_key().unwrap().as_str(), "DO00ACCESS");
        assert_eq!(creds.expose_secret_key().unwrap().as_str(), "s3cr3t/key");
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut creds = Credentials::new("access", "secret").unwrap();
        creds.dispose();
        creds.dispose();
        assert!(creds.is_disposed());
        assert!(matches!(
            creds.expose_access_key(),
            Err(UploadError::CredentialsDisposed)
        ));
        assert!(matches!(
            creds.expose_secret_key(),
            Err(UploadError::CredentialsDisposed)
        ));
    }

    #[test]
    fn test_character_entry() {
        let mut creds = Credentials::empty();
        for c in "keyx".chars() {
            creds.access_key_mut().push(c);
        }
        assert!(creds.access_key_mut().pop());
        creds.secret_key_mut().push('é');
        creds.secret_key_mut().push('ß');

        assert_eq!(creds.expose_access_key().unwrap().as_str(), "key");
        assert_eq!(creds.expose_secret_key().unwrap().as_str(), "éß");
        assert_eq!(creds.secret_key_mut().len(), 2);
    }

    #[test]
    fn test_empty_buffer_is_rejected_on_expose() {
        let creds = Credentials::empty();
        assert!(matches!(
            creds.expose_access_key(),
            Err(UploadError::InvalidArgument { name: "access_key", .. })
        ));
    }

    #[test]
    fn test_pop_on_empty_buffer() {
        let mut buffer = SecretBuffer::new();
        assert!(!buffer.pop());
        buffer.push('a');
        assert!(buffer.pop());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_growth_preserves_contents() {
        let mut buffer = SecretBuffer::new();
        let long: String = std::iter::repeat('k').take(200).collect();
        for c in long.chars() {
            buffer.push(c);
        }
        assert_eq!(buffer.expose().as_str(), long);
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_debug_is_redacted() {
        let creds = Credentials::new("visible-access", "visible-secret").unwrap();
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("visible"));
    }
}
