//! Trust store integration
//!
//! Provides the interface to the platform's hardware-backed keyed storage:
//! - iOS/macOS: Keychain generic-password items with `SecAccessControl`
//! - Android: Keystore-wrapped entries with `setUserAuthenticationRequired`
//!
//! Status codes follow the Keychain `OSStatus` values on every platform so the
//! host sees one set of numbers.

use authgate_core::Error as AuthError;
use async_trait::async_trait;
use zeroize::Zeroizing;

/// Keychain `OSStatus` values
pub mod status {
    /// `errSecSuccess`
    pub const SUCCESS: i32 = 0;
    /// `errSecUserCanceled`
    pub const USER_CANCELED: i32 = -128;
    /// `errSecParam`
    pub const PARAM: i32 = -50;
    /// `errSecNotAvailable`
    pub const NOT_AVAILABLE: i32 = -25291;
    /// `errSecAuthFailed`
    pub const AUTH_FAILED: i32 = -25293;
    /// `errSecDuplicateItem`
    pub const DUPLICATE_ITEM: i32 = -25299;
    /// `errSecItemNotFound`
    pub const ITEM_NOT_FOUND: i32 = -25300;
    /// `errSecInteractionNotAllowed`
    pub const INTERACTION_NOT_ALLOWED: i32 = -25308;
}

/// When at-rest data may be decrypted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AccessibilityTier {
    /// Only while the device is unlocked; never migrates to another device
    #[default]
    WhenUnlockedThisDeviceOnly,
    /// Only while unlocked and a passcode is set; removed with the passcode
    WhenPasscodeSetThisDeviceOnly,
    /// After the first unlock since boot
    AfterFirstUnlockThisDeviceOnly,
}

impl AccessibilityTier {
    /// Platform constant name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WhenUnlockedThisDeviceOnly => "kSecAttrAccessibleWhenUnlockedThisDeviceOnly",
            Self::WhenPasscodeSetThisDeviceOnly => {
                "kSecAttrAccessibleWhenPasscodeSetThisDeviceOnly"
            }
            Self::AfterFirstUnlockThisDeviceOnly => {
                "kSecAttrAccessibleAfterFirstUnlockThisDeviceOnly"
            }
        }
    }

    /// Parse a host string. Unknown values map to the default tier.
    pub fn parse(value: &str) -> Self {
        match value {
            "kSecAttrAccessibleWhenUnlockedThisDeviceOnly" => Self::WhenUnlockedThisDeviceOnly,
            "kSecAttrAccessibleWhenPasscodeSetThisDeviceOnly" => {
                Self::WhenPasscodeSetThisDeviceOnly
            }
            "kSecAttrAccessibleAfterFirstUnlockThisDeviceOnly" => {
                Self::AfterFirstUnlockThisDeviceOnly
            }
            other => {
                tracing::debug!("Unknown accessibility tier {:?}, using default", other);
                Self::default()
            }
        }
    }

    /// Data is readable only while the device is unlocked
    pub fn requires_unlocked_device(&self) -> bool {
        !matches!(self, Self::AfterFirstUnlockThisDeviceOnly)
    }

    /// Raise the tier to the minimum allowed for secrets
    pub fn for_secret(self) -> Self {
        if self.requires_unlocked_device() {
            self
        } else {
            tracing::warn!(
                "Accessibility tier {} is too weak for a secret, using {}",
                self.as_str(),
                Self::WhenUnlockedThisDeviceOnly.as_str()
            );
            Self::WhenUnlockedThisDeviceOnly
        }
    }
}

/// Access control attached to an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessControl {
    /// Fresh biometric match against the set enrolled when the item was written.
    /// Enrolling or removing a biometric invalidates the item.
    BiometryCurrentSet,
}

/// Attributes of an item being added
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemAttributes {
    /// Unique item key (account)
    pub key: String,
    /// Accessibility tier
    pub tier: AccessibilityTier,
    /// Optional access control
    pub access_control: Option<AccessControl>,
}

/// Platform capabilities for secure storage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeystoreCapabilities {
    /// Has hardware-backed secure storage (TEE, StrongBox, Secure Enclave)
    pub has_secure_hardware: bool,
    /// Supports biometric access control on items
    pub supports_biometric_binding: bool,
    /// Platform name
    pub platform: Platform,
}

/// Supported platforms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Platform {
    /// Android (Keystore, StrongBox)
    Android,
    /// iOS (Keychain, Secure Enclave)
    Ios,
    /// macOS (Keychain, Secure Enclave)
    MacOs,
    /// Any other target; only the software keystore is available
    #[default]
    Unknown,
}

impl Platform {
    /// Detect current platform at compile time
    pub fn current() -> Self {
        #[cfg(target_os = "android")]
        return Platform::Android;

        #[cfg(target_os = "ios")]
        return Platform::Ios;

        #[cfg(target_os = "macos")]
        return Platform::MacOs;

        #[cfg(not(any(target_os = "android", target_os = "ios", target_os = "macos")))]
        return Platform::Unknown;
    }
}

/// Trust store result for operations that may require user interaction
#[derive(Debug)]
pub enum KeystoreResult<T> {
    /// Success
    Success(T),
    /// User cancelled authentication
    Cancelled,
    /// Authentication failed or the item's biometric binding is stale
    AuthFailed,
    /// Biometry locked out after too many attempts
    LockedOut,
    /// No item under the key
    NotFound,
    /// Item already exists
    DuplicateItem,
    /// Item needs user interaction that cannot be shown now
    InteractionNotAllowed,
    /// Feature not available on this device
    NotAvailable,
    /// Another authentication prompt is already on screen
    Busy,
    /// Any other platform status
    Status(i32),
}

impl<T> KeystoreResult<T> {
    /// `OSStatus` equivalent
    pub fn status(&self) -> i32 {
        match self {
            Self::Success(_) => status::SUCCESS,
            Self::Cancelled => status::USER_CANCELED,
            Self::AuthFailed | Self::LockedOut => status::AUTH_FAILED,
            Self::NotFound => status::ITEM_NOT_FOUND,
            Self::DuplicateItem => status::DUPLICATE_ITEM,
            Self::InteractionNotAllowed | Self::Busy => status::INTERACTION_NOT_ALLOWED,
            Self::NotAvailable => status::NOT_AVAILABLE,
            Self::Status(code) => *code,
        }
    }

    /// Whether the operation succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Map to the shared error taxonomy
    pub fn into_result(self) -> authgate_core::Result<T> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Cancelled => Err(AuthError::UserCancelled),
            Self::AuthFailed => Err(AuthError::AuthFailed),
            Self::LockedOut => Err(AuthError::LockedOut),
            Self::NotFound => Err(AuthError::NotFound),
            Self::InteractionNotAllowed => Err(AuthError::AuthRequired),
            Self::Busy => Err(AuthError::Busy),
            Self::DuplicateItem => Err(AuthError::TrustStoreError(status::DUPLICATE_ITEM)),
            Self::NotAvailable => Err(AuthError::TrustStoreError(status::NOT_AVAILABLE)),
            Self::Status(code) => Err(AuthError::TrustStoreError(code)),
        }
    }

    /// Drop the success value
    pub fn discard(self) -> KeystoreResult<()> {
        match self {
            Self::Success(_) => KeystoreResult::Success(()),
            Self::Cancelled => KeystoreResult::Cancelled,
            Self::AuthFailed => KeystoreResult::AuthFailed,
            Self::LockedOut => KeystoreResult::LockedOut,
            Self::NotFound => KeystoreResult::NotFound,
            Self::DuplicateItem => KeystoreResult::DuplicateItem,
            Self::InteractionNotAllowed => KeystoreResult::InteractionNotAllowed,
            Self::NotAvailable => KeystoreResult::NotAvailable,
            Self::Busy => KeystoreResult::Busy,
            Self::Status(code) => KeystoreResult::Status(code),
        }
    }
}

/// Platform trust store abstraction
///
/// Implementations bridge to native code. Access control is enforced here, not
/// by callers: a gated item must be unreadable without a fresh biometric match
/// against the set it was written under.
#[async_trait]
pub trait TrustStoreProvider: Send + Sync {
    /// Get platform capabilities
    fn capabilities(&self) -> KeystoreCapabilities;

    /// Add a new item. Fails with `DuplicateItem` if the key exists.
    async fn add(&self, attributes: ItemAttributes, payload: &[u8]) -> KeystoreResult<()>;

    /// Read an item.
    ///
    /// `prompt` is the reason shown if the item requires authentication;
    /// without it a gated read returns `InteractionNotAllowed`.
    async fn copy_matching(
        &self,
        key: &str,
        prompt: Option<&str>,
    ) -> KeystoreResult<Zeroizing<Vec<u8>>>;

    /// Delete an item
    async fn delete(&self, key: &str) -> KeystoreResult<()>;

    /// Whether an item exists. Never prompts.
    async fn contains(&self, key: &str) -> bool;
}
