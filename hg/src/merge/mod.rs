//! ID-preserving merge engine
//!
//! Reconciles an incoming list of items for one nested collection against
//! the persisted list. The payload list becomes the canonical list; stable
//! ids of items the payload refers to survive, everything else is a creation.

use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use crate::domain::id::{mint_from_seed, mint_id, same_id};
use crate::domain::{
    ActionPlanEntry, ActionTask, ArtifactContent, ContentIdea, CustomerSegment, GtmChannel, GtmContent,
    GtmDetailedChannelContent, MetricKpi, PreparationTask,
};

/// An item of a collection carrying a stable id
pub trait Identified {
    fn stable_id(&self) -> Option<&str>;
    fn set_stable_id(&mut self, id: String);
}

macro_rules! impl_identified {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Identified for $ty {
                fn stable_id(&self) -> Option<&str> {
                    self.id.as_deref()
                }

                fn set_stable_id(&mut self, id: String) {
                    self.id = Some(id);
                }
            }
        )*
    };
}

impl_identified!(
    CustomerSegment,
    GtmChannel,
    PreparationTask,
    ContentIdea,
    ActionPlanEntry,
    ActionTask,
    MetricKpi,
);

/// Reconcile child collections of a matched item against its previous version
pub trait Reconcile {
    /// `previous` is the persisted item this one resolved to, `None` for creations
    fn reconcile_children(&mut self, _previous: Option<&Self>) {}
}

impl Reconcile for CustomerSegment {}
impl Reconcile for GtmChannel {}
impl Reconcile for PreparationTask {}
impl Reconcile for ContentIdea {}
impl Reconcile for ActionTask {}
impl Reconcile for MetricKpi {}

impl Reconcile for ActionPlanEntry {
    fn reconcile_children(&mut self, previous: Option<&Self>) {
        let tasks = std::mem::take(&mut self.tasks);
        let empty = Vec::new();
        let persisted = previous.map(|p| &p.tasks).unwrap_or(&empty);
        self.tasks = merge_collection(persisted, tasks);
    }
}

/// Merge a payload list against the persisted list
///
/// - a payload id matching a persisted id keeps the persisted id
/// - an unknown but valid id seeds the new id, an invalid or absent one mints fresh
/// - persisted items missing from the payload are dropped
/// - duplicate ids within the payload resolve first-wins; later ones mint fresh
pub fn merge_collection<T>(persisted: &[T], payload: Vec<T>) -> Vec<T>
where
    T: Identified + Reconcile,
{
    debug!(persisted = persisted.len(), payload = payload.len(), "merge_collection: called");
    let mut taken: HashSet<String> = HashSet::new();
    let mut merged = Vec::with_capacity(payload.len());

    for mut item in payload {
        let client_id = item.stable_id().map(str::to_string);

        let matched = client_id
            .as_deref()
            .and_then(|cid| persisted.iter().find(|p| p.stable_id().is_some_and(|sid| same_id(cid, sid))));

        let (id, previous) = match matched {
            Some(prev) => {
                let sid = prev.stable_id().unwrap_or_default().to_string();
                if taken.contains(&sid) {
                    (mint_id(), None)
                } else {
                    (sid, Some(prev))
                }
            }
            None => {
                let seeded = mint_from_seed(client_id.as_deref());
                if taken.contains(&seeded) { (mint_id(), None) } else { (seeded, None) }
            }
        };

        item.set_stable_id(id.clone());
        item.reconcile_children(previous);
        taken.insert(id);
        merged.push(item);
    }

    debug!(merged = merged.len(), "merge_collection: done");
    merged
}

fn merge_gtm(content: &mut GtmContent, previous: Option<&GtmContent>) {
    // channels are reconciled per stage, a channel moved between stages is new
    let empty = GtmContent::default();
    let previous = previous.unwrap_or(&empty);
    for (stage, prev) in content.stages_mut().into_iter().zip(previous.stages()) {
        let channels = std::mem::take(&mut stage.channels);
        stage.channels = merge_collection(&prev.channels, channels);
    }
}

fn merge_detailed_channel(content: &mut GtmDetailedChannelContent, previous: Option<&GtmDetailedChannelContent>) {
    let empty = GtmDetailedChannelContent::default();
    let previous = previous.unwrap_or(&empty);

    let tasks = std::mem::take(&mut content.preparation_tasks);
    content.preparation_tasks = merge_collection(&previous.preparation_tasks, tasks);

    let ideas = std::mem::take(&mut content.content_ideas);
    content.content_ideas = merge_collection(&previous.content_ideas, ideas);

    let plan = std::mem::take(&mut content.action_plan);
    content.action_plan = merge_collection(&previous.action_plan, plan);

    let kpis = std::mem::take(&mut content.metrics_and_kpis);
    content.metrics_and_kpis = merge_collection(&previous.metrics_and_kpis, kpis);
}

impl ArtifactContent {
    /// Reconcile every identified collection against the previous content
    ///
    /// With no previous content (or content of another kind) every item is a
    /// creation and gets a minted id.
    pub fn reconcile(&mut self, previous: Option<&ArtifactContent>) {
        debug!(kind = %self.kind(), has_previous = previous.is_some(), "reconcile: called");
        match self {
            ArtifactContent::Core(core) => {
                let empty = Vec::new();
                let persisted = previous
                    .and_then(|p| p.as_core())
                    .map(|c| &c.customer_segments)
                    .unwrap_or(&empty);
                let segments = std::mem::take(&mut core.customer_segments);
                core.customer_segments = merge_collection(persisted, segments);
            }
            ArtifactContent::Gtm(gtm) => merge_gtm(gtm, previous.and_then(|p| p.as_gtm())),
            ArtifactContent::GtmDetailedChannel(detailed) => {
                merge_detailed_channel(detailed, previous.and_then(|p| p.as_detailed_channel()))
            }
            ArtifactContent::MarketResearch(_) | ArtifactContent::Validation(_) | ArtifactContent::Packing(_) => {}
        }
    }
}

/// Overlay a partial edit onto a persisted JSON document
///
/// Objects merge key by key, recursively; arrays and scalars in the patch
/// replace what was there.
pub fn overlay(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                let nested = value.is_object() && base_map.get(&key).is_some_and(Value::is_object);
                if nested && let Some(existing) = base_map.get_mut(&key) {
                    overlay(existing, value);
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base, patch) => *base = patch,
    }
}
