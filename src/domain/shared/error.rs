//! Telephony errors

use thiserror::Error;

/// Errors surfaced by every public telephony operation.
///
/// Payloads are plain strings so the error stays `Clone` and can be fanned out
/// to listeners as well as returned to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelephonyError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to decrypt sealed data: {0}")]
    DecryptSealedData(String),

    #[error("User is not signed in")]
    NotSignedIn,

    #[error("Phone number search failed: {0}")]
    Search(String),

    #[error("Country code is not supported: {0}")]
    UnsupportedCountryCode(String),

    #[error("Invalid country code: {0}")]
    InvalidCountryCode(String),

    #[error("Phone number provisioning failed: {0}")]
    NumberProvision(String),

    #[error("Phone number deletion failed: {0}")]
    NumberDeletion(String),

    #[error("Failed to get phone number: {0}")]
    GetPhoneNumber(String),

    #[error("Failed to list phone numbers: {0}")]
    GetAllPhoneNumbers(String),

    #[error("Failed to create public key: {0}")]
    CreatePublicKey(String),

    #[error("Failed to send message: {0}")]
    SendMessage(String),

    #[error("Failed to get message: {0}")]
    GetMessage(String),

    #[error("Failed to list messages: {0}")]
    GetMessages(String),

    #[error("Failed to delete message: {0}")]
    DeleteMessage(String),

    #[error("File upload failed: {0}")]
    FileUpload(String),

    #[error("File download failed: {0}")]
    FileDownload(String),

    #[error("Failed to get conversation: {0}")]
    GetConversation(String),

    #[error("Failed to list conversations: {0}")]
    GetConversations(String),

    #[error("Insufficient entitlement: {0}")]
    InsufficientEntitlement(String),

    #[error("Failed to authorize outgoing call: {0}")]
    CallingFailedToAuthorizeOutgoingCall(String),

    #[error("Failed to start outgoing call: {0}")]
    CallingFailedToStartOutgoingCall(String),

    #[error("Failed to accept incoming call: {0}")]
    CallingFailedToAcceptIncomingCall(String),

    #[error("Call failed to connect: {0}")]
    CallingFailedToConnect(String),

    #[error("Call disconnected: {0}")]
    CallingDisconnected(String),

    #[error("Call was cancelled")]
    CallingCallCancelled,

    #[error("Failed to register for incoming calls: {0}")]
    CallingFailedToRegisterForIncomingCalls(String),

    #[error("Failed to deregister for incoming calls: {0}")]
    CallingFailedToDeregisterForIncomingCalls(String),

    #[error("No voice calling vendor configured")]
    CallingVendorUnavailable,

    #[error("Failed to get call record: {0}")]
    GetCallRecord(String),

    #[error("Failed to delete call record: {0}")]
    DeleteCallRecord(String),

    #[error("Failed to get voicemail: {0}")]
    GetVoicemail(String),

    #[error("Failed to delete voicemail: {0}")]
    DeleteVoicemail(String),

    #[error("Failed to reset telephony client: {0}")]
    ResetTelephonyClient(String),

    #[error("Failed to subscribe to messages: {0}")]
    SubscribeToMessages(String),

    #[error("Failed to subscribe to call records: {0}")]
    SubscribeToCallRecords(String),

    #[error("Failed to subscribe to voicemails: {0}")]
    SubscribeToVoicemails(String),

    #[error("Key store error: {0}")]
    KeyStore(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl TelephonyError {
    /// Whether the failure came from the network layer rather than the backend
    /// rejecting the request.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}
