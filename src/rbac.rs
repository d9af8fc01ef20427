use crate::record::ResourceGroupRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single permission unit identified by a URI.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Uri")]
    uri: String,
}

impl Resource {
    /// Creates a resource.
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
        }
    }

    /// Returns the resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the resource URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

/// Named collection of resources, unique by URI.
///
/// Resources keep their insertion order. Adding a resource whose URI is
/// already present is a no-op.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ResourceGroupRecord")]
pub struct ResourceGroup {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Resources")]
    resources: Vec<Resource>,
    #[serde(rename = "Mapper")]
    index: HashMap<String, usize>,
}

impl ResourceGroup {
    /// Creates an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub(crate) fn from_parts(
        name: String,
        resources: Vec<Resource>,
        index: HashMap<String, usize>,
    ) -> Self {
        Self {
            name,
            resources,
            index,
        }
    }

    /// Adds resources, skipping any whose URI is already in the group.
    pub fn add(mut self, resources: impl IntoIterator<Item = Resource>) -> Self {
        for resource in resources {
            if self.index.contains_key(resource.uri()) {
                continue;
            }
            self.index
                .insert(resource.uri().to_string(), self.resources.len());
            self.resources.push(resource);
        }
        self
    }

    /// Returns the group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether a resource with `uri` is in the group.
    pub fn exist(&self, uri: &str) -> bool {
        self.index.contains_key(uri)
    }

    /// Looks up a resource by URI.
    pub fn resource(&self, uri: &str) -> Option<&Resource> {
        self.index.get(uri).and_then(|&at| self.resources.get(at))
    }

    /// Returns all resources in insertion order.
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Returns the number of resources.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

/// Named bundle of resource groups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "ResourceGroups")]
    resource_groups: Vec<ResourceGroup>,
}

impl Role {
    /// Creates a role without resource groups.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_groups: Vec::new(),
        }
    }

    /// Appends resource groups.
    pub fn add_resource_group(mut self, groups: impl IntoIterator<Item = ResourceGroup>) -> Self {
        self.resource_groups.extend(groups);
        self
    }

    /// Returns the role name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the resource groups in insertion order.
    pub fn resource_groups(&self) -> &[ResourceGroup] {
        &self.resource_groups
    }

    /// Returns every resource of every group. Duplicates across groups are kept.
    pub fn resources(&self) -> Vec<Resource> {
        self.resource_groups
            .iter()
            .flat_map(|group| group.resources().iter().cloned())
            .collect()
    }

    /// Returns whether this role grants all of `uris`.
    ///
    /// See [`count_matches`] for the exact counting rule.
    pub fn exist<I, U>(&self, uris: I) -> bool
    where
        I: IntoIterator<Item = U>,
        U: AsRef<str>,
    {
        let uris: Vec<U> = uris.into_iter().collect();
        count_matches(self.resource_groups.iter(), &uris, |group, uri| {
            group.exist(uri)
        })
    }
}

/// Factory handed to role-resolution callbacks.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoleFactory;

impl RoleFactory {
    /// Creates a role.
    pub fn new_role(&self, name: impl Into<String>) -> Role {
        Role::new(name)
    }

    /// Creates a resource group.
    pub fn new_resource_group(&self, name: impl Into<String>) -> ResourceGroup {
        ResourceGroup::new(name)
    }

    /// Creates a resource.
    pub fn new_resource(&self, name: impl Into<String>, uri: impl Into<String>) -> Resource {
        Resource::new(name, uri)
    }
}

/// AND-match of `wanted` against `items` with one shared counter.
///
/// The counter is bumped for every (item, wanted) pair that matches and the
/// check succeeds as soon as it reaches `wanted.len()`. A wanted value matched
/// by two items therefore counts twice, which can stand in for a different
/// value that matched nothing. An empty `wanted` never matches.
pub(crate) fn count_matches<'a, T, U, F>(
    items: impl IntoIterator<Item = &'a T>,
    wanted: &[U],
    matches: F,
) -> bool
where
    T: 'a,
    U: AsRef<str>,
    F: Fn(&T, &str) -> bool,
{
    let threshold = wanted.len();
    let mut count = 0;
    for item in items {
        for value in wanted {
            if matches(item, value.as_ref()) {
                count += 1;
                if count == threshold {
                    return true;
                }
            }
        }
    }
    false
}
