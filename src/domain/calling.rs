/// Voice calling domain model
///
/// The SDK never talks to a voice network directly. A [`VoiceCallingVendor`]
/// places and accepts calls and reports call progress as [`VendorCallEvent`]s,
/// which are translated into [`ActiveCallListener`] notifications here.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::shared::{Result, TelephonyError};
use super::subscriber::{ConnectionState, TelephonySubscriber};

/// Device that call audio can be routed to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VoiceCallAudioDevice {
    BluetoothHeadset,
    WiredHeadset,
    Earpiece,
    Speakerphone,
    Unknown,
}

/// Receives lifecycle notifications for one active call
pub trait ActiveCallListener: TelephonySubscriber {
    fn active_voice_call_did_connect(&self, call: &ActiveVoiceCall);

    fn active_voice_call_did_fail_to_connect(&self, error: TelephonyError);

    /// `error` is set when the call dropped because of a failure
    fn active_voice_call_did_disconnect(&self, call: &ActiveVoiceCall, error: Option<TelephonyError>);

    fn active_voice_call_did_change_mute_state(&self, call: &ActiveVoiceCall, is_muted: bool);

    fn active_voice_call_did_change_audio_device(
        &self,
        call: &ActiveVoiceCall,
        audio_device: VoiceCallAudioDevice,
    );
}

/// Receives incoming call invites delivered by push notification
pub trait IncomingCallNotificationListener: TelephonySubscriber {
    fn incoming_call_received(&self, call: IncomingCall);

    fn incoming_call_canceled(&self, call: IncomingCall, error: Option<TelephonyError>);
}

/// Static capabilities of a vendor's calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VendorCapabilities {
    /// DTMF tones can be sent; `play_dtmf` is never forwarded otherwise
    pub supports_dtmf: bool,
    /// Calls can be placed on and taken off hold
    pub supports_holding: bool,
}

/// Vendor-side handle of a connected call
pub trait CallingVendorCall: Send + Sync {
    fn disconnect(&self);

    fn set_muted(&self, muted: bool);

    fn set_on_hold(&self, on_hold: bool);

    fn play_dtmf(&self, digits: &str);

    /// Route audio to `device`. Returns false when the device is not available.
    fn route_audio(&self, device: VoiceCallAudioDevice) -> bool;
}

/// Progress reported by the vendor for a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorCallEvent {
    Connected,
    ConnectFailed(String),
    /// Carries the failure reason when the call did not end normally
    Disconnected(Option<String>),
    AudioDeviceChanged(VoiceCallAudioDevice),
}

/// A call the vendor has started to connect
pub struct VendorConnection {
    pub call: Arc<dyn CallingVendorCall>,
    pub events: mpsc::Receiver<VendorCallEvent>,
}

/// Incoming call invite as parsed by the vendor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInvite {
    pub call_sid: String,
    pub from: String,
    pub to: String,
}

/// Push payload recognised by the vendor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorPushMessage {
    Invite(CallInvite),
    CancelledInvite(CallInvite),
}

/// Vendor authorization returned by the backend for a device registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorAuthorization {
    pub vendor: String,
    pub access_token: String,
}

/// Third-party voice calling backend
#[async_trait]
pub trait VoiceCallingVendor: Send + Sync {
    /// Vendor name as reported in backend authorizations, e.g. `Twilio`
    fn name(&self) -> &str;

    fn capabilities(&self) -> VendorCapabilities;

    async fn connect(&self, access_token: &str, local: &str, remote: &str) -> Result<VendorConnection>;

    async fn accept(&self, invite: &CallInvite) -> Result<VendorConnection>;

    async fn reject(&self, invite: &CallInvite) -> Result<()>;

    async fn register(&self, access_token: &str, push_token: &str) -> Result<()>;

    async fn unregister(&self, access_token: &str, push_token: &str) -> Result<()>;

    /// Returns `None` when the payload does not belong to this vendor
    fn parse_push_message(&self, payload: &HashMap<String, String>) -> Option<VendorPushMessage>;
}

/// An active voice call.
///
/// Used to monitor call events and to mute, hold, route audio or disconnect.
pub struct ActiveVoiceCall {
    pub local_phone_number: String,
    pub remote_phone_number: String,
    pub call_id: Uuid,
    capabilities: VendorCapabilities,
    vendor_call: Arc<dyn CallingVendorCall>,
    listener: Arc<dyn ActiveCallListener>,
    muted: AtomicBool,
    on_hold: AtomicBool,
    audio: Mutex<AudioRoute>,
}

#[derive(Debug, Clone, Copy)]
struct AudioRoute {
    current: VoiceCallAudioDevice,
    previous: VoiceCallAudioDevice,
}

impl ActiveVoiceCall {
    pub fn new(
        local_phone_number: impl Into<String>,
        remote_phone_number: impl Into<String>,
        capabilities: VendorCapabilities,
        vendor_call: Arc<dyn CallingVendorCall>,
        listener: Arc<dyn ActiveCallListener>,
    ) -> Self {
        Self {
            local_phone_number: local_phone_number.into(),
            remote_phone_number: remote_phone_number.into(),
            call_id: Uuid::new_v4(),
            capabilities,
            vendor_call,
            listener,
            muted: AtomicBool::new(false),
            on_hold: AtomicBool::new(false),
            audio: Mutex::new(AudioRoute {
                current: VoiceCallAudioDevice::Earpiece,
                previous: VoiceCallAudioDevice::Earpiece,
            }),
        }
    }

    pub fn disconnect(&self) {
        info!("Disconnecting call {}", self.call_id);
        self.vendor_call.disconnect();
    }

    /// Whether outgoing call audio is muted
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn set_muted(&self, muted: bool) {
        self.vendor_call.set_muted(muted);
        self.muted.store(muted, Ordering::SeqCst);
        self.listener
            .active_voice_call_did_change_mute_state(self, muted);
    }

    pub fn is_on_hold(&self) -> bool {
        self.on_hold.load(Ordering::SeqCst)
    }

    /// Returns false when the vendor cannot hold calls
    pub fn set_on_hold(&self, on_hold: bool) -> bool {
        if !self.capabilities.supports_holding {
            debug!("Vendor does not support holding, ignoring hold request");
            return false;
        }
        self.vendor_call.set_on_hold(on_hold);
        self.on_hold.store(on_hold, Ordering::SeqCst);
        true
    }

    /// Returns false when the vendor cannot send DTMF tones
    pub fn play_dtmf(&self, digits: &str) -> bool {
        if !self.capabilities.supports_dtmf {
            debug!("Vendor does not support DTMF, ignoring digits");
            return false;
        }
        self.vendor_call.play_dtmf(digits);
        true
    }

    pub fn audio_device(&self) -> VoiceCallAudioDevice {
        self.route().current
    }

    /// Whether call audio is routed through the speakers
    pub fn is_on_speaker(&self) -> bool {
        self.audio_device() == VoiceCallAudioDevice::Speakerphone
    }

    /// Routes audio to the speaker, or back to the device in use before it
    pub fn set_audio_output_to_speaker(&self, speaker: bool) {
        let route = self.route();
        let target = if speaker {
            VoiceCallAudioDevice::Speakerphone
        } else if route.current == VoiceCallAudioDevice::Speakerphone {
            route.previous
        } else {
            return;
        };

        if target == route.current {
            return;
        }
        if self.vendor_call.route_audio(target) {
            self.audio_device_changed(target);
        } else {
            warn!("Audio device {:?} is not available", target);
        }
    }

    fn audio_device_changed(&self, device: VoiceCallAudioDevice) {
        {
            let mut route = self.audio.lock().unwrap_or_else(|e| e.into_inner());
            if route.current == device {
                return;
            }
            route.previous = route.current;
            route.current = device;
        }
        self.listener
            .active_voice_call_did_change_audio_device(self, device);
    }

    fn route(&self) -> AudioRoute {
        *self.audio.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ActiveVoiceCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveVoiceCall")
            .field("call_id", &self.call_id)
            .field("local_phone_number", &self.local_phone_number)
            .field("remote_phone_number", &self.remote_phone_number)
            .field("muted", &self.is_muted())
            .finish()
    }
}

/// Forward vendor events for `call` to its listener until the call ends.
pub fn track_call(
    call: Arc<ActiveVoiceCall>,
    mut events: mpsc::Receiver<VendorCallEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Call {} event: {:?}", call.call_id, event);
            match event {
                VendorCallEvent::Connected => {
                    info!("Call {} connected", call.call_id);
                    call.listener.active_voice_call_did_connect(&call);
                }
                VendorCallEvent::ConnectFailed(reason) => {
                    warn!("Call {} failed to connect: {}", call.call_id, reason);
                    call.listener
                        .active_voice_call_did_fail_to_connect(TelephonyError::CallingFailedToConnect(reason));
                    return;
                }
                VendorCallEvent::Disconnected(reason) => {
                    info!("Call {} disconnected", call.call_id);
                    let error = reason.map(TelephonyError::CallingDisconnected);
                    call.listener.active_voice_call_did_disconnect(&call, error);
                    call.listener
                        .connection_status_changed(ConnectionState::Disconnected);
                    return;
                }
                VendorCallEvent::AudioDeviceChanged(device) => {
                    call.audio_device_changed(device);
                }
            }
        }
        debug!("Vendor event stream for call {} closed", call.call_id);
    })
}

/// An incoming call that can be accepted or declined
#[derive(Clone)]
pub struct IncomingCall {
    /// The number receiving the call
    pub local_number: String,
    /// The number the call is coming from
    pub remote_number: String,
    pub call_sid: String,
    invite: CallInvite,
    vendor: Arc<dyn VoiceCallingVendor>,
}

impl IncomingCall {
    pub fn new(invite: CallInvite, vendor: Arc<dyn VoiceCallingVendor>) -> Self {
        Self {
            local_number: invite.to.clone(),
            remote_number: invite.from.clone(),
            call_sid: invite.call_sid.clone(),
            invite,
            vendor,
        }
    }

    /// Accepts the call; `listener` receives the call lifecycle from here on
    pub async fn accept_with_listener(
        &self,
        listener: Arc<dyn ActiveCallListener>,
    ) -> Result<Arc<ActiveVoiceCall>> {
        info!("Accepting incoming call {}", self.call_sid);
        let connection = match self.vendor.accept(&self.invite).await {
            Ok(connection) => connection,
            Err(e) => {
                let error = TelephonyError::CallingFailedToAcceptIncomingCall(e.to_string());
                listener.active_voice_call_did_fail_to_connect(error.clone());
                return Err(error);
            }
        };

        let call = Arc::new(ActiveVoiceCall::new(
            self.local_number.clone(),
            self.remote_number.clone(),
            self.vendor.capabilities(),
            connection.call,
            listener,
        ));
        track_call(call.clone(), connection.events);
        Ok(call)
    }

    pub async fn decline(&self) -> Result<()> {
        info!("Declining incoming call {}", self.call_sid);
        self.vendor.reject(&self.invite).await
    }
}

impl std::fmt::Debug for IncomingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingCall")
            .field("local_number", &self.local_number)
            .field("remote_number", &self.remote_number)
            .field("call_sid", &self.call_sid)
            .finish()
    }
}
