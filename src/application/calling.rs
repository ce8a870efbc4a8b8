//! Voice calling, call records and voicemail
//!
//! Calls are placed through a pluggable [`VoiceCallingVendor`]; the backend
//! only hands out vendor access tokens.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::requests::{expect_field, notification, ErrorKind};
use super::subscription_manager::{establish, SubscriptionManager};
use super::unseal;
use crate::domain::call_record::CallRecord;
use crate::domain::calling::{
    track_call, ActiveCallListener, ActiveVoiceCall, IncomingCall,
    IncomingCallNotificationListener, VendorAuthorization, VendorPushMessage, VoiceCallingVendor,
};
use crate::domain::keys::TelephonyKeyManager;
use crate::domain::phone_number::PhoneNumber;
use crate::domain::shared::{Result, TelephonyError, TelephonyListToken};
use crate::domain::subscriber::{CallRecordSubscriber, Subscriber, VoicemailSubscriber};
use crate::domain::voicemail::Voicemail;
use crate::infrastructure::graphql::operations::{
    self, FIELD_CREATE_VOICE_CALL, FIELD_DELETE_CALL_RECORD, FIELD_DELETE_VOICEMAIL,
    FIELD_GET_CALL_RECORD, FIELD_GET_VOICEMAIL, FIELD_LIST_CALL_RECORDS, FIELD_LIST_VOICEMAILS,
    FIELD_ON_CALL_RECORD, FIELD_ON_VOICEMAIL, FIELD_REGISTER_DEVICE, FIELD_UNREGISTER_DEVICE,
};
use crate::infrastructure::graphql::wire::{
    WireDeviceRegistration, WireList, WireSealedCallRecord, WireSealedVoicemail, WireVoiceCall,
};
use crate::infrastructure::graphql::{GraphQlClient, GraphQlOperation};

pub const DEFAULT_CALL_RECORD_SUBSCRIBER: &str = "DEFAULT_CALL_RECORD_SUBSCRIBER";
pub const DEFAULT_VOICEMAIL_SUBSCRIBER: &str = "DEFAULT_VOICEMAIL_SUBSCRIBER";

pub struct TelephonyCalling {
    graphql: Arc<dyn GraphQlClient>,
    keys: Arc<dyn TelephonyKeyManager>,
    vendor: Option<Arc<dyn VoiceCallingVendor>>,
    call_records: Arc<SubscriptionManager>,
    voicemails: Arc<SubscriptionManager>,
    /// Latest vendor token handed out for incoming calls
    vendor_access_token: Mutex<Option<String>>,
}

impl TelephonyCalling {
    pub fn new(
        graphql: Arc<dyn GraphQlClient>,
        keys: Arc<dyn TelephonyKeyManager>,
        vendor: Option<Arc<dyn VoiceCallingVendor>>,
    ) -> Self {
        Self {
            graphql,
            keys,
            vendor,
            call_records: Arc::new(SubscriptionManager::new("call_records")),
            voicemails: Arc::new(SubscriptionManager::new("voicemails")),
            vendor_access_token: Mutex::new(None),
        }
    }

    fn vendor(&self) -> Result<&Arc<dyn VoiceCallingVendor>> {
        self.vendor
            .as_ref()
            .ok_or(TelephonyError::CallingVendorUnavailable)
    }

    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        operation: GraphQlOperation,
        field: &str,
        kind: ErrorKind,
    ) -> Result<T> {
        let response = self.graphql.execute(operation).await?;
        expect_field(&response, field, kind)
    }

    /// Token from the most recent device registration
    pub fn latest_vendor_access_token(&self) -> Option<String> {
        self.vendor_access_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn remove_all_subscribers(&self) {
        self.call_records.remove_all_subscribers();
        self.voicemails.remove_all_subscribers();
    }

    // ===== Outgoing calls =====

    /// Place a call from `local` to `remote`.
    ///
    /// Failures are reported to `listener` and returned. On success the call
    /// lifecycle continues on `listener`.
    pub async fn create_voice_call(
        &self,
        local: &PhoneNumber,
        remote: &str,
        listener: Arc<dyn ActiveCallListener>,
    ) -> Result<Arc<ActiveVoiceCall>> {
        let vendor = match self.vendor() {
            Ok(vendor) => vendor.clone(),
            Err(e) => {
                listener.active_voice_call_did_fail_to_connect(e.clone());
                return Err(e);
            }
        };

        info!("Creating voice call {} -> {}", local.phone_number, remote);
        let token = match self.authorize_call(&local.phone_number, remote).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Voice call authorization failed: {}", e);
                let error = TelephonyError::CallingFailedToAuthorizeOutgoingCall(e.to_string());
                listener.active_voice_call_did_fail_to_connect(error.clone());
                return Err(error);
            }
        };

        let connection = match vendor.connect(&token, &local.phone_number, remote).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!("{} failed to start call: {}", vendor.name(), e);
                let error = TelephonyError::CallingFailedToStartOutgoingCall(e.to_string());
                listener.active_voice_call_did_fail_to_connect(error.clone());
                return Err(error);
            }
        };

        let call = Arc::new(ActiveVoiceCall::new(
            local.phone_number.clone(),
            remote,
            vendor.capabilities(),
            connection.call,
            listener,
        ));
        track_call(call.clone(), connection.events);
        Ok(call)
    }

    async fn authorize_call(&self, local: &str, remote: &str) -> Result<String> {
        let call: WireVoiceCall = self
            .query(
                operations::create_voice_call(local, remote),
                FIELD_CREATE_VOICE_CALL,
                TelephonyError::CallingFailedToAuthorizeOutgoingCall,
            )
            .await?;
        call.vendor_authorization
            .map(|auth| auth.access_token)
            .ok_or_else(|| {
                TelephonyError::CallingFailedToAuthorizeOutgoingCall(
                    "no vendor authorization returned".to_string(),
                )
            })
    }

    // ===== Incoming calls =====

    pub async fn register_for_incoming_calls(&self, push_token: &str) -> Result<()> {
        let vendor = self.vendor()?.clone();
        let registration: WireDeviceRegistration = self
            .query(
                operations::register_device_for_incoming_calls(),
                FIELD_REGISTER_DEVICE,
                TelephonyError::CallingFailedToRegisterForIncomingCalls,
            )
            .await?;

        for auth in self.matching_authorizations(vendor.as_ref(), registration) {
            vendor
                .register(&auth.access_token, push_token)
                .await
                .map_err(|e| TelephonyError::CallingFailedToRegisterForIncomingCalls(e.to_string()))?;
            *self
                .vendor_access_token
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = Some(auth.access_token);
            info!("Registered for incoming calls with {}", vendor.name());
        }
        Ok(())
    }

    pub async fn deregister_for_incoming_calls(&self, push_token: &str) -> Result<()> {
        let vendor = self.vendor()?.clone();
        let registration: WireDeviceRegistration = self
            .query(
                operations::unregister_device_for_incoming_calls(),
                FIELD_UNREGISTER_DEVICE,
                TelephonyError::CallingFailedToDeregisterForIncomingCalls,
            )
            .await?;

        for auth in self.matching_authorizations(vendor.as_ref(), registration) {
            vendor
                .unregister(&auth.access_token, push_token)
                .await
                .map_err(|e| {
                    TelephonyError::CallingFailedToDeregisterForIncomingCalls(e.to_string())
                })?;
            info!("Deregistered from incoming calls with {}", vendor.name());
        }
        Ok(())
    }

    fn matching_authorizations(
        &self,
        vendor: &dyn VoiceCallingVendor,
        registration: WireDeviceRegistration,
    ) -> Vec<VendorAuthorization> {
        registration
            .vendor_authorizations
            .into_iter()
            .filter(|auth| auth.vendor == vendor.name())
            .map(|auth| VendorAuthorization {
                vendor: auth.vendor,
                access_token: auth.access_token,
            })
            .collect()
    }

    /// Hand a push payload to the vendor. Returns whether it was a calling
    /// notification.
    pub fn handle_incoming_push_notification(
        &self,
        payload: &HashMap<String, String>,
        listener: Arc<dyn IncomingCallNotificationListener>,
    ) -> bool {
        let Some(vendor) = self.vendor.as_ref() else {
            debug!("No calling vendor configured, ignoring push notification");
            return false;
        };

        match vendor.parse_push_message(payload) {
            Some(VendorPushMessage::Invite(invite)) => {
                info!("Incoming call {} from {}", invite.call_sid, invite.from);
                listener.incoming_call_received(IncomingCall::new(invite, vendor.clone()));
                true
            }
            Some(VendorPushMessage::CancelledInvite(invite)) => {
                info!("Incoming call {} cancelled", invite.call_sid);
                listener.incoming_call_canceled(IncomingCall::new(invite, vendor.clone()), None);
                true
            }
            None => false,
        }
    }

    // ===== Call records =====

    pub async fn get_call_record(&self, id: &str) -> Result<CallRecord> {
        let wire: WireSealedCallRecord = self
            .query(
                operations::get_call_record(id),
                FIELD_GET_CALL_RECORD,
                TelephonyError::GetCallRecord,
            )
            .await?;
        unseal::call_record(wire, self.keys.as_ref())
    }

    /// Finished calls of `local`, newest first
    pub async fn get_call_records(
        &self,
        local: &PhoneNumber,
        limit: Option<u32>,
        next_token: Option<&str>,
    ) -> Result<TelephonyListToken<CallRecord>> {
        let list: WireList<WireSealedCallRecord> = self
            .query(
                operations::list_call_records(&local.id, limit, next_token),
                FIELD_LIST_CALL_RECORDS,
                TelephonyError::GetCallRecord,
            )
            .await?;

        let mut records = list
            .items
            .into_iter()
            .map(|wire| unseal::call_record(wire, self.keys.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        records.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(TelephonyListToken::new(records, list.next_token))
    }

    /// Returns the id of the deleted record
    pub async fn delete_call_record(&self, id: &str) -> Result<String> {
        self.query(
            operations::delete_call_record(id),
            FIELD_DELETE_CALL_RECORD,
            TelephonyError::DeleteCallRecord,
        )
        .await
    }

    pub async fn subscribe_to_call_records(
        &self,
        subscriber: Arc<dyn CallRecordSubscriber>,
        id: Option<&str>,
    ) -> Result<()> {
        let owner = self
            .keys
            .owner()
            .map_err(|e| TelephonyError::SubscribeToCallRecords(e.to_string()))?;
        let id = id.unwrap_or(DEFAULT_CALL_RECORD_SUBSCRIBER).to_string();

        let keys = self.keys.clone();
        let manager = Arc::downgrade(&self.call_records);
        establish(
            &self.call_records,
            self.graphql.as_ref(),
            id,
            Subscriber::CallRecord(subscriber),
            operations::on_call_record(&owner),
            move |data| {
                let Some(wire) = notification::<WireSealedCallRecord>(&data, FIELD_ON_CALL_RECORD)
                else {
                    return;
                };
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                match unseal::call_record(wire, keys.as_ref()) {
                    Ok(record) => manager.call_record_received(&record),
                    Err(e) => warn!("Dropping call record notification: {}", e),
                }
            },
            TelephonyError::SubscribeToCallRecords,
        )
        .await
    }

    /// `None` removes every call record subscriber
    pub fn unsubscribe_from_call_records(&self, id: Option<&str>) {
        match id {
            Some(id) => self.call_records.remove_subscriber(id),
            None => self.call_records.remove_all_subscribers(),
        }
    }

    // ===== Voicemail =====

    pub async fn get_voicemail(&self, id: &str) -> Result<Voicemail> {
        let wire: WireSealedVoicemail = self
            .query(
                operations::get_voicemail(id),
                FIELD_GET_VOICEMAIL,
                TelephonyError::GetVoicemail,
            )
            .await?;
        unseal::voicemail(wire, self.keys.as_ref())
    }

    pub async fn get_voicemails(
        &self,
        local: &PhoneNumber,
        limit: Option<u32>,
        next_token: Option<&str>,
    ) -> Result<TelephonyListToken<Voicemail>> {
        let list: WireList<WireSealedVoicemail> = self
            .query(
                operations::list_voicemails(&local.id, limit, next_token),
                FIELD_LIST_VOICEMAILS,
                TelephonyError::GetVoicemail,
            )
            .await?;

        let mut voicemails = list
            .items
            .into_iter()
            .map(|wire| unseal::voicemail(wire, self.keys.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        voicemails.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(TelephonyListToken::new(voicemails, list.next_token))
    }

    /// Returns the id of the deleted voicemail
    pub async fn delete_voicemail(&self, id: &str) -> Result<String> {
        self.query(
            operations::delete_voicemail(id),
            FIELD_DELETE_VOICEMAIL,
            TelephonyError::DeleteVoicemail,
        )
        .await
    }

    pub async fn subscribe_to_voicemails(
        &self,
        subscriber: Arc<dyn VoicemailSubscriber>,
        id: Option<&str>,
    ) -> Result<()> {
        let owner = self
            .keys
            .owner()
            .map_err(|e| TelephonyError::SubscribeToVoicemails(e.to_string()))?;
        let id = id.unwrap_or(DEFAULT_VOICEMAIL_SUBSCRIBER).to_string();

        let keys = self.keys.clone();
        let manager = Arc::downgrade(&self.voicemails);
        establish(
            &self.voicemails,
            self.graphql.as_ref(),
            id,
            Subscriber::Voicemail(subscriber),
            operations::on_voicemail(&owner),
            move |data| {
                let Some(wire) = notification::<WireSealedVoicemail>(&data, FIELD_ON_VOICEMAIL)
                else {
                    return;
                };
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                match unseal::voicemail(wire, keys.as_ref()) {
                    Ok(voicemail) => manager.voicemail_updated(&voicemail),
                    Err(e) => warn!("Dropping voicemail notification: {}", e),
                }
            },
            TelephonyError::SubscribeToVoicemails,
        )
        .await
    }

    /// `None` removes every voicemail subscriber
    pub fn unsubscribe_from_voicemails(&self, id: Option<&str>) {
        match id {
            Some(id) => self.voicemails.remove_subscriber(id),
            None => self.voicemails.remove_all_subscribers(),
        }
    }
}
