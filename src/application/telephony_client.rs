//! Telephony client
//!
//! Entry point of the SDK: phone number search and provisioning, SMS/MMS
//! messaging, conversations and message subscriptions. Voice calling lives
//! behind [`TelephonyClient::calling`].

use bytes::Bytes;
use futures::future::try_join_all;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::calling::TelephonyCalling;
use super::requests::{expect_field, notification, poll, ErrorKind, Poll};
use super::subscription_manager::{establish, SubscriptionManager};
use super::unseal;
use crate::config::Config;
use crate::domain::calling::VoiceCallingVendor;
use crate::domain::keys::TelephonyKeyManager;
use crate::domain::media::MediaObject;
use crate::domain::message::{sort_newest_first, PhoneMessage, PhoneMessageConversation};
use crate::domain::phone_number::{
    PhoneNumber, PhoneNumberSearchResult, PhoneNumberState, SearchState, SupportedCountriesResult,
};
use crate::domain::session::{OwnershipProofIssuer, UserSession};
use crate::domain::shared::{ConversationId, Result, TelephonyError, TelephonyListToken};
use crate::domain::subscriber::{PhoneMessageSubscriber, Subscriber};
use crate::infrastructure::graphql::operations::{
    self, FIELD_DELETE_MESSAGE, FIELD_DEPROVISION_PHONE_NUMBER, FIELD_GET_CONVERSATION,
    FIELD_GET_MESSAGE, FIELD_GET_PHONE_NUMBER, FIELD_LIST_CONVERSATIONS, FIELD_LIST_MESSAGES,
    FIELD_LIST_PHONE_NUMBERS, FIELD_ON_MESSAGE, FIELD_PHONE_NUMBER_SEARCH,
    FIELD_PROVISION_PHONE_NUMBER, FIELD_SEARCH_PHONE_NUMBERS, FIELD_SEND_MESSAGE,
    FIELD_SUPPORTED_COUNTRIES,
};
use crate::infrastructure::graphql::wire::{
    WireConversation, WireList, WirePhoneNumber, WireSealedMessage, WireSearchResult,
    WireSupportedCountries,
};
use crate::infrastructure::graphql::{GraphQlClient, GraphQlError, GraphQlOperation};
use crate::infrastructure::storage::{content_type_for, ObjectStore};

/// Subscriber id used when the caller does not name one
pub const DEFAULT_MESSAGE_SUBSCRIBER: &str = "DEFAULT_MESSAGE_SUBSCRIBER";

pub const DEFAULT_SEARCH_LIMIT: u32 = 10;

/// Audience of the ownership proof attached to a provisioning request
pub const PHONE_NUMBER_AUDIENCE: &str = "sudoplatform.sudotelephony.phone-number";

const NO_ENTITLEMENT: &str = "sudoplatform.telephony.NoPhoneNumberEntitlementError";
const COUNTRY_NOT_SUPPORTED: &str = "Telephony:CountryNotSupported";
const INVALID_COUNTRY_CODE: &str = "Telephony:InvalidCountryCode";

pub struct TelephonyClient {
    config: Config,
    session: Arc<dyn UserSession>,
    proof_issuer: Arc<dyn OwnershipProofIssuer>,
    graphql: Arc<dyn GraphQlClient>,
    object_store: Arc<dyn ObjectStore>,
    keys: Arc<dyn TelephonyKeyManager>,
    messages: Arc<SubscriptionManager>,
    calling: TelephonyCalling,
}

impl TelephonyClient {
    pub(crate) fn from_parts(
        config: Config,
        session: Arc<dyn UserSession>,
        proof_issuer: Arc<dyn OwnershipProofIssuer>,
        graphql: Arc<dyn GraphQlClient>,
        object_store: Arc<dyn ObjectStore>,
        keys: Arc<dyn TelephonyKeyManager>,
        vendor: Option<Arc<dyn VoiceCallingVendor>>,
    ) -> Self {
        let calling = TelephonyCalling::new(graphql.clone(), keys.clone(), vendor);
        Self {
            config,
            session,
            proof_issuer,
            graphql,
            object_store,
            keys,
            messages: Arc::new(SubscriptionManager::new("messages")),
            calling,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn calling(&self) -> &TelephonyCalling {
        &self.calling
    }

    pub fn key_manager(&self) -> Arc<dyn TelephonyKeyManager> {
        self.keys.clone()
    }

    pub fn is_registered(&self) -> bool {
        self.session.is_registered()
    }

    /// Drop every subscription, sign the session out and delete all keys
    pub async fn reset(&self) -> Result<()> {
        info!("Resetting telephony client");
        self.messages.remove_all_subscribers();
        self.calling.remove_all_subscribers();

        self.session
            .reset()
            .await
            .map_err(|e| TelephonyError::ResetTelephonyClient(e.to_string()))?;
        self.keys
            .remove_all_keys()
            .map_err(|e| TelephonyError::ResetTelephonyClient(e.to_string()))?;
        Ok(())
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

    fn require_key_id(&self, kind: ErrorKind) -> Result<String> {
        self.keys
            .key_id()?
            .ok_or_else(|| kind("no key pair has been generated".to_string()))
    }

    // ===== Phone numbers =====

    pub async fn get_supported_countries(&self) -> Result<SupportedCountriesResult> {
        let wire: WireSupportedCountries = self
            .query(
                operations::supported_countries(),
                FIELD_SUPPORTED_COUNTRIES,
                TelephonyError::Search,
            )
            .await?;
        Ok(SupportedCountriesResult {
            countries: wire.countries,
        })
    }

    pub async fn search_available_phone_numbers(
        &self,
        country: &str,
        limit: Option<u32>,
    ) -> Result<PhoneNumberSearchResult> {
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        self.run_search(country, operations::search_by_country(country, limit))
            .await
    }

    /// An empty prefix searches the whole country
    pub async fn search_available_phone_numbers_by_prefix(
        &self,
        country: &str,
        prefix: &str,
        limit: Option<u32>,
    ) -> Result<PhoneNumberSearchResult> {
        if prefix.is_empty() {
            return self.search_available_phone_numbers(country, limit).await;
        }
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        self.run_search(country, operations::search_by_prefix(country, prefix, limit))
            .await
    }

    pub async fn search_available_phone_numbers_by_gps(
        &self,
        country: &str,
        latitude: f64,
        longitude: f64,
        limit: Option<u32>,
    ) -> Result<PhoneNumberSearchResult> {
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        self.run_search(
            country,
            operations::search_by_gps(country, latitude, longitude, limit),
        )
        .await
    }

    async fn run_search(
        &self,
        country: &str,
        operation: GraphQlOperation,
    ) -> Result<PhoneNumberSearchResult> {
        debug!("Searching phone numbers in {}", country);
        let response = self.graphql.execute(operation).await?;
        if let Some(error) = response.first_error() {
            return Err(search_error(country, error));
        }
        let started: WireSearchResult =
            expect_field(&response, FIELD_SEARCH_PHONE_NUMBERS, TelephonyError::Search)?;

        let graphql = &self.graphql;
        let search_id = started.id.as_str();
        poll(
            "phone number search",
            self.config.poll_interval(),
            self.config.polling.max_attempts,
            || async move {
                let response = graphql
                    .execute(operations::phone_number_search(search_id))
                    .await?;
                if let Some(error) = response.first_error() {
                    return Err(search_error(country, error));
                }
                let result: WireSearchResult =
                    expect_field(&response, FIELD_PHONE_NUMBER_SEARCH, TelephonyError::Search)?;
                match result.state {
                    SearchState::Complete => Ok(Poll::Ready(unseal::search_result(result))),
                    SearchState::Failed => Err(TelephonyError::Search(format!(
                        "search {} failed",
                        result.id
                    ))),
                    SearchState::Searching | SearchState::Unknown => Ok(Poll::Pending),
                }
            },
        )
        .await
    }

    /// Provision `phone_number` for the sudo `sudo_id`, generating and
    /// registering a key pair on first use. Resolves once the number is
    /// active.
    pub async fn provision_phone_number(
        &self,
        country: &str,
        phone_number: &str,
        sudo_id: &str,
    ) -> Result<PhoneNumber> {
        if !self.keys.has_key_pair()? {
            self.keys.generate_key_pair().await?;
        }
        let key_ring_id = self.keys.key_ring_id()?.ok_or_else(|| {
            TelephonyError::NumberProvision("no key ring id available".to_string())
        })?;
        let proof = self
            .proof_issuer
            .ownership_proof(sudo_id, PHONE_NUMBER_AUDIENCE)
            .await?;

        info!("Provisioning {} in {}", phone_number, country);
        let response = self
            .graphql
            .execute(operations::provision_phone_number(
                country,
                phone_number,
                &proof,
                &key_ring_id,
            ))
            .await?;
        if let Some(error) = response.first_error() {
            return Err(provision_error(error));
        }
        let provisioned: WirePhoneNumber = expect_field(
            &response,
            FIELD_PROVISION_PHONE_NUMBER,
            TelephonyError::NumberProvision,
        )?;
        if provisioned.state == PhoneNumberState::Complete {
            return Ok(unseal::phone_number(provisioned));
        }

        let graphql = &self.graphql;
        let id = provisioned.id.as_str();
        poll(
            "phone number provisioning",
            self.config.poll_interval(),
            self.config.polling.max_attempts,
            || async move {
                let response = graphql.execute(operations::get_phone_number(id)).await?;
                let number: WirePhoneNumber = expect_field(
                    &response,
                    FIELD_GET_PHONE_NUMBER,
                    TelephonyError::NumberProvision,
                )?;
                match number.state {
                    PhoneNumberState::Complete => Ok(Poll::Ready(unseal::phone_number(number))),
                    PhoneNumberState::Failed => Err(TelephonyError::NumberProvision(format!(
                        "provisioning of {} failed",
                        number.phone_number
                    ))),
                    _ => Ok(Poll::Pending),
                }
            },
        )
        .await
    }

    pub async fn delete_phone_number(&self, phone_number: &str) -> Result<PhoneNumber> {
        info!("Deprovisioning {}", phone_number);
        let wire: WirePhoneNumber = self
            .query(
                operations::deprovision_phone_number(phone_number),
                FIELD_DEPROVISION_PHONE_NUMBER,
                TelephonyError::NumberDeletion,
            )
            .await?;
        Ok(unseal::phone_number(wire))
    }

    pub async fn list_phone_numbers(
        &self,
        sudo_id: Option<&str>,
        limit: Option<u32>,
        next_token: Option<&str>,
    ) -> Result<TelephonyListToken<PhoneNumber>> {
        let list: WireList<WirePhoneNumber> = self
            .query(
                operations::list_phone_numbers(sudo_id, limit, next_token),
                FIELD_LIST_PHONE_NUMBERS,
                TelephonyError::GetAllPhoneNumbers,
            )
            .await?;
        Ok(TelephonyListToken::new(list.items, list.next_token).map(unseal::phone_number))
    }

    pub async fn get_phone_number(&self, id: &str) -> Result<PhoneNumber> {
        let wire: WirePhoneNumber = self
            .query(
                operations::get_phone_number(id),
                FIELD_GET_PHONE_NUMBER,
                TelephonyError::GetPhoneNumber,
            )
            .await?;
        Ok(unseal::phone_number(wire))
    }

    // ===== Messages =====

    pub async fn send_sms_message(
        &self,
        local: &PhoneNumber,
        remote: &str,
        body: &str,
    ) -> Result<PhoneMessage> {
        self.send_message(local, remote, body, &[]).await
    }

    /// Upload the file at `path` to the transient bucket, then send it as
    /// the message media
    pub async fn send_mms_message(
        &self,
        local: &PhoneNumber,
        remote: &str,
        body: &str,
        path: &Path,
    ) -> Result<PhoneMessage> {
        let identity = self.session.identity_id().ok_or(TelephonyError::NotSignedIn)?;
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| TelephonyError::FileUpload(format!("{}: {}", path.display(), e)))?;

        let key = format!("{}/telephony/media/{}", identity, Uuid::new_v4());
        let storage = &self.config.storage;
        let content_type = content_type_for(path);

        info!("Uploading {} bytes of {} for MMS", data.len(), content_type);
        self.object_store
            .upload(
                &storage.transient_bucket,
                &key,
                Bytes::from(data),
                content_type.as_ref(),
            )
            .await?;

        let media = MediaObject::new(key, &storage.transient_bucket, &storage.region);
        self.send_message(local, remote, body, &[media]).await
    }

    async fn send_message(
        &self,
        local: &PhoneNumber,
        remote: &str,
        body: &str,
        media: &[MediaObject],
    ) -> Result<PhoneMessage> {
        let id: String = self
            .query(
                operations::send_message(&local.phone_number, remote, body, media),
                FIELD_SEND_MESSAGE,
                TelephonyError::SendMessage,
            )
            .await?;
        debug!("Sent message {}", id);

        self.get_message(&id).await.map_err(|e| {
            warn!("Sent message {} could not be fetched: {}", id, e);
            TelephonyError::SendMessage(
                "Failed to retrieve sent message, it may have succeeded".to_string(),
            )
        })
    }

    pub async fn get_message(&self, id: &str) -> Result<PhoneMessage> {
        let key_id = self.require_key_id(TelephonyError::GetMessage)?;
        let wire: WireSealedMessage = self
            .query(
                operations::get_message(id, &key_id),
                FIELD_GET_MESSAGE,
                TelephonyError::GetMessage,
            )
            .await?;
        unseal::message(wire, self.keys.as_ref())
    }

    /// Messages exchanged between `local` and `remote`, newest first
    pub async fn get_messages(
        &self,
        local: &PhoneNumber,
        remote: &str,
        limit: Option<u32>,
        next_token: Option<&str>,
    ) -> Result<TelephonyListToken<PhoneMessage>> {
        let conversation = self.conversation_id(local, remote)?;
        self.get_messages_by_conversation(conversation.as_str(), limit, next_token)
            .await
    }

    pub async fn get_messages_by_conversation(
        &self,
        conversation_id: &str,
        limit: Option<u32>,
        next_token: Option<&str>,
    ) -> Result<TelephonyListToken<PhoneMessage>> {
        let key_id = self.require_key_id(TelephonyError::GetMessages)?;
        let list: WireList<WireSealedMessage> = self
            .query(
                operations::list_messages(conversation_id, &key_id, limit, next_token),
                FIELD_LIST_MESSAGES,
                TelephonyError::GetMessages,
            )
            .await?;

        let mut messages = list
            .items
            .into_iter()
            .map(|wire| unseal::message(wire, self.keys.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        sort_newest_first(&mut messages);
        Ok(TelephonyListToken::new(messages, list.next_token))
    }

    /// Returns the id of the deleted message
    pub async fn delete_message(&self, id: &str) -> Result<String> {
        self.query(
            operations::delete_message(id),
            FIELD_DELETE_MESSAGE,
            TelephonyError::DeleteMessage,
        )
        .await
    }

    /// Download message media and open it
    pub async fn download_data(&self, media: &MediaObject) -> Result<Vec<u8>> {
        debug!("Downloading media {}", media.key);
        let sealed = self.object_store.download(&media.bucket, &media.key).await?;
        self.keys.decrypt_sealed_data(&sealed)
    }

    pub async fn subscribe_to_messages(
        &self,
        subscriber: Arc<dyn PhoneMessageSubscriber>,
        id: Option<&str>,
    ) -> Result<()> {
        let owner = self
            .keys
            .owner()
            .map_err(|e| TelephonyError::SubscribeToMessages(e.to_string()))?;
        let id = id.unwrap_or(DEFAULT_MESSAGE_SUBSCRIBER).to_string();

        let keys = self.keys.clone();
        let manager = Arc::downgrade(&self.messages);
        establish(
            &self.messages,
            self.graphql.as_ref(),
            id,
            Subscriber::PhoneMessage(subscriber),
            operations::on_message(&owner),
            move |data| {
                let Some(wire) = notification::<WireSealedMessage>(&data, FIELD_ON_MESSAGE) else {
                    return;
                };
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                match unseal::message(wire, keys.as_ref()) {
                    Ok(message) => manager.phone_message_received(&message),
                    Err(e) => warn!("Dropping message notification: {}", e),
                }
            },
            TelephonyError::SubscribeToMessages,
        )
        .await
    }

    /// `None` removes every message subscriber
    pub fn unsubscribe_from_phone_messages(&self, id: Option<&str>) {
        match id {
            Some(id) => self.messages.remove_subscriber(id),
            None => self.messages.remove_all_subscribers(),
        }
    }

    // ===== Conversations =====

    fn conversation_id(&self, local: &PhoneNumber, remote: &str) -> Result<ConversationId> {
        let owner = self.keys.owner()?;
        Ok(ConversationId::derive(&owner, &local.phone_number, remote))
    }

    pub async fn get_conversation(&self, id: &str) -> Result<PhoneMessageConversation> {
        let wire: WireConversation = self
            .query(
                operations::get_conversation(id),
                FIELD_GET_CONVERSATION,
                TelephonyError::GetConversation,
            )
            .await?;
        self.with_latest_message(wire, TelephonyError::GetConversation)
            .await
    }

    pub async fn get_conversation_for_numbers(
        &self,
        local: &PhoneNumber,
        remote: &str,
    ) -> Result<PhoneMessageConversation> {
        let id = self.conversation_id(local, remote)?;
        self.get_conversation(id.as_str()).await
    }

    pub async fn get_conversations(
        &self,
        local: &PhoneNumber,
        limit: Option<u32>,
        next_token: Option<&str>,
    ) -> Result<TelephonyListToken<PhoneMessageConversation>> {
        let list: WireList<WireConversation> = self
            .query(
                operations::list_conversations(&local.id, limit, next_token),
                FIELD_LIST_CONVERSATIONS,
                TelephonyError::GetConversations,
            )
            .await?;

        let conversations = try_join_all(
            list.items
                .into_iter()
                .map(|wire| self.with_latest_message(wire, TelephonyError::GetConversations)),
        )
        .await?;
        Ok(TelephonyListToken::new(conversations, list.next_token))
    }

    async fn with_latest_message(
        &self,
        wire: WireConversation,
        kind: ErrorKind,
    ) -> Result<PhoneMessageConversation> {
        let latest = match wire.last_message.as_deref() {
            Some(message_id) => Some(
                self.get_message(message_id)
                    .await
                    .map_err(|e| kind(e.to_string()))?,
            ),
            None => None,
        };
        Ok(unseal::conversation(wire, latest))
    }
}

fn search_error(country: &str, error: &GraphQlError) -> TelephonyError {
    match error.error_type() {
        Some(COUNTRY_NOT_SUPPORTED) => TelephonyError::UnsupportedCountryCode(country.to_string()),
        Some(INVALID_COUNTRY_CODE) => TelephonyError::InvalidCountryCode(country.to_string()),
        _ => TelephonyError::Search(error.message.clone()),
    }
}

fn provision_error(error: &GraphQlError) -> TelephonyError {
    let entitlement = error.message.contains(NO_ENTITLEMENT)
        || error.error_type() == Some(NO_ENTITLEMENT);
    if entitlement {
        TelephonyError::InsufficientEntitlement(error.message.clone())
    } else {
        TelephonyError::NumberProvision(error.message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_error_mapping() {
        let unsupported = GraphQlError::with_type("nope", COUNTRY_NOT_SUPPORTED);
        assert_eq!(
            search_error("ZZ", &unsupported),
            TelephonyError::UnsupportedCountryCode("ZZ".into())
        );

        let invalid = GraphQlError {
            message: "bad".into(),
            error_type: None,
            extensions: Some(serde_json::json!({ "errorType": INVALID_COUNTRY_CODE })),
        };
        assert_eq!(
            search_error("U", &invalid),
            TelephonyError::InvalidCountryCode("U".into())
        );

        assert_eq!(
            search_error("US", &GraphQlError::new("boom")),
            TelephonyError::Search("boom".into())
        );
    }

    #[test]
    fn test_provision_error_mapping() {
        let error = GraphQlError::new(format!("{}: limit reached", NO_ENTITLEMENT));
        assert!(matches!(
            provision_error(&error),
            TelephonyError::InsufficientEntitlement(_)
        ));
        assert!(matches!(
            provision_error(&GraphQlError::new("busy")),
            TelephonyError::NumberProvision(_)
        ));
    }
}
