//! Generic record shape of a consumer stored by an untyped session backend.
//!
//! ```text
//! { "Tag", "ClientTag", "FullTag",
//!   "Roles": [ { "Name", "ResourceGroups": [ { "Name", "Mapper": {uri: index},
//!                                              "Resources": [ { "Name", "Uri" } ] } ] } ] }
//! ```

use crate::error::{Error, Result};
use crate::rbac::{Resource, ResourceGroup, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const ROLES_FIELD: &str = "Roles";

/// Consumer identity fields without the role data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ConsumerRecord {
    #[serde(rename = "Tag")]
    pub tag: String,
    #[serde(rename = "ClientTag")]
    pub client_tag: String,
    #[serde(rename = "FullTag")]
    pub full_tag: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResourceGroupRecord {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Mapper", default)]
    mapper: Option<HashMap<String, usize>>,
    #[serde(rename = "Resources", default)]
    resources: Option<Vec<Resource>>,
}

impl TryFrom<ResourceGroupRecord> for ResourceGroup {
    type Error = String;

    fn try_from(record: ResourceGroupRecord) -> std::result::Result<Self, Self::Error> {
        let resources = record.resources.unwrap_or_default();
        let mapper = record.mapper.unwrap_or_default();
        if mapper.len() != resources.len() {
            return Err(format!(
                "resource group {} indexes {} uris but holds {} resources",
                record.name,
                mapper.len(),
                resources.len()
            ));
        }
        for (at, resource) in resources.iter().enumerate() {
            if mapper.get(resource.uri()) != Some(&at) {
                return Err(format!(
                    "resource group {} has a stale index entry for {}",
                    record.name,
                    resource.uri()
                ));
            }
        }
        Ok(ResourceGroup::from_parts(
            record.name,
            resources,
            mapper,
        ))
    }
}

/// Splits a generic record into identity fields and live roles.
///
/// Roles are pulled out and converted on their own before the remaining
/// fields are parsed.
pub(crate) fn parse_consumer_record(
    value: serde_json::Value,
) -> Result<(ConsumerRecord, Vec<Role>)> {
    let serde_json::Value::Object(mut fields) = value else {
        return Err(Error::Serialization(
            "consumer record must be an object".to_string(),
        ));
    };

    let roles = match fields.remove(ROLES_FIELD) {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(raw) => serde_json::from_value::<Vec<Role>>(raw)?,
    };

    let record: ConsumerRecord = serde_json::from_value(serde_json::Value::Object(fields))?;
    if record.full_tag != format!("{}{}", record.tag, record.client_tag) {
        return Err(Error::Serialization(format!(
            "full tag {} does not join tag and client tag",
            record.full_tag
        )));
    }

    Ok((record, roles))
}
