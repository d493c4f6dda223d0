//! Route 53 [`DnsProvider`] (feature `route53-backend`).
//!
//! Drives `ChangeResourceRecordSets` for UPSERT/DELETE and
//! `ListResourceRecordSets` for reads, via `aws-sdk-route53`.
//!
//! Route 53 requires an exact resource-record-set match to delete, so
//! [`Route53Provider::delete`] reads the current set before issuing the
//! `DELETE` change.

use std::collections::BTreeSet;

use async_trait::async_trait;
use aws_sdk_route53::types::{Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType};
use aws_sdk_route53::Client;

use crate::error::DriverError;

use super::provider::{DnsProvider, RrSet};

/// Record TTL Route 53 is told to use for every change — the original's
/// `route53TTL` constant.
const RECORD_TTL: i64 = 300;

pub struct Route53Provider {
    client: Client,
    hosted_zone_id: String,
}

impl Route53Provider {
    /// Build a client from the process's default AWS credential chain and
    /// the configured hosted zone id.
    pub async fn connect(hosted_zone_id: String) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: Client::new(&config),
            hosted_zone_id,
        }
    }

    fn rr_type(record_type: &str) -> Result<RrType, DriverError> {
        match record_type {
            "A" => Ok(RrType::A),
            "TXT" => Ok(RrType::Txt),
            "CNAME" => Ok(RrType::Cname),
            other => Err(DriverError::Internal {
                reason: format!("unsupported record type {other}"),
            }),
        }
    }

    /// TXT values must be quoted on the wire; A/CNAME values are literal.
    fn encode_value(rr_type: &RrType, value: &str) -> String {
        if *rr_type == RrType::Txt {
            format!("\"{value}\"")
        } else {
            value.to_owned()
        }
    }

    fn decode_value(rr_type: &RrType, value: &str) -> String {
        if *rr_type == RrType::Txt {
            value.trim_matches('"').to_owned()
        } else {
            value.to_owned()
        }
    }

    async fn submit_change(&self, action: ChangeAction, record_set: ResourceRecordSet) -> Result<(), DriverError> {
        let change = Change::builder()
            .action(action)
            .resource_record_set(record_set)
            .build()
            .map_err(|e| DriverError::Internal { reason: e.to_string() })?;
        let batch = ChangeBatch::builder()
            .changes(change)
            .build()
            .map_err(|e| DriverError::Internal { reason: e.to_string() })?;

        self.client
            .change_resource_record_sets()
            .hosted_zone_id(&self.hosted_zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(|e| DriverError::BackendUnavailable { reason: e.to_string() })?;
        Ok(())
    }
}

#[async_trait]
impl DnsProvider for Route53Provider {
    async fn upsert(&self, rrset: &RrSet) -> Result<(), DriverError> {
        let rr_type = Self::rr_type(rrset.record_type)?;
        let mut records = Vec::with_capacity(rrset.values.len());
        for value in &rrset.values {
            let record = ResourceRecord::builder()
                .value(Self::encode_value(&rr_type, value))
                .build()
                .map_err(|e| DriverError::Internal { reason: e.to_string() })?;
            records.push(record);
        }

        let record_set = ResourceRecordSet::builder()
            .name(rrset.name.clone())
            .r#type(rr_type)
            .ttl(RECORD_TTL)
            .set_resource_records(Some(records))
            .build()
            .map_err(|e| DriverError::Internal { reason: e.to_string() })?;

        self.submit_change(ChangeAction::Upsert, record_set).await
    }

    async fn delete(&self, name: &str, record_type: &'static str) -> Result<(), DriverError> {
        let rr_type = Self::rr_type(record_type)?;
        let existing = self.list(name, record_type).await?;
        if existing.is_empty() {
            return Ok(());
        }

        let mut records = Vec::with_capacity(existing.len());
        for value in &existing {
            let record = ResourceRecord::builder()
                .value(Self::encode_value(&rr_type, value))
                .build()
                .map_err(|e| DriverError::Internal { reason: e.to_string() })?;
            records.push(record);
        }

        let record_set = ResourceRecordSet::builder()
            .name(name.to_owned())
            .r#type(rr_type)
            .ttl(RECORD_TTL)
            .set_resource_records(Some(records))
            .build()
            .map_err(|e| DriverError::Internal { reason: e.to_string() })?;

        self.submit_change(ChangeAction::Delete, record_set).await
    }

    async fn list(&self, name: &str, record_type: &'static str) -> Result<BTreeSet<String>, DriverError> {
        let rr_type = Self::rr_type(record_type)?;
        let resp = self
            .client
            .list_resource_record_sets()
            .hosted_zone_id(&self.hosted_zone_id)
            .start_record_name(name)
            .start_record_type(rr_type.clone())
            .max_items(1)
            .send()
            .await
            .map_err(|e| DriverError::BackendUnavailable { reason: e.to_string() })?;

        let wanted = name.trim_end_matches('.');
        let mut values = BTreeSet::new();
        for set in resp.resource_record_sets() {
            if set.name().trim_end_matches('.') != wanted || set.r#type() != &rr_type {
                continue;
            }
            for record in set.resource_records() {
                if let Some(value) = record.value() {
                    values.insert(Self::decode_value(&rr_type, value));
                }
            }
        }
        Ok(values)
    }
}
