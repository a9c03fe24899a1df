//! Classification of the resources blocking a stack delete

use crate::error::UnrecognizedResource;
use stackreap_common::{ResourceClass, ResourceSummary};
use std::collections::BTreeMap;

/// A delete-failed resource and the class it was sorted into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockingResource {
    pub logical_id: String,
    pub physical_id: String,
    pub resource_type: String,
    pub class: ResourceClass,
}

/// Delete-failed resources of one stack, bucketed by class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    buckets: BTreeMap<ResourceClass, Vec<BlockingResource>>,
    retain: Vec<String>,
}

/// Bucket every delete-failed resource by class.
///
/// Resources in any other status are ignored. The retain set lists the
/// logical ids of everything bucketed, in listing order.
pub fn classify(resources: &[ResourceSummary]) -> Classification {
    let mut classification = Classification::default();

    for resource in resources.iter().filter(|r| r.is_delete_failed()) {
        let class = ResourceClass::from_type_tag(&resource.resource_type);
        classification.retain.push(resource.logical_id.clone());
        classification
            .buckets
            .entry(class)
            .or_default()
            .push(BlockingResource {
                logical_id: resource.logical_id.clone(),
                physical_id: resource.physical_id.clone(),
                resource_type: resource.resource_type.clone(),
                class,
            });
    }

    classification
}

impl Classification {
    /// Logical ids to pass as `RetainResources` on the next delete
    pub fn retain_set(&self) -> &[String] {
        &self.retain
    }

    pub fn buckets(&self) -> &BTreeMap<ResourceClass, Vec<BlockingResource>> {
        &self.buckets
    }

    /// Blocking resources with no cleanup strategy
    pub fn unrecognized(&self) -> Vec<UnrecognizedResource> {
        self.buckets
            .get(&ResourceClass::Unrecognized)
            .into_iter()
            .flatten()
            .map(|r| UnrecognizedResource {
                logical_id: r.logical_id.clone(),
                resource_type: r.resource_type.clone(),
            })
            .collect()
    }

    /// Every blocking resource, grouped by class
    pub fn blocking(&self) -> impl Iterator<Item = &BlockingResource> {
        self.buckets.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.retain.is_empty()
    }
}
