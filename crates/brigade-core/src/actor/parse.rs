//! Free-text to `ActionResult` adapter.
//!
//! Actors backed by a text generator return prose. The scheduling core only
//! consumes the structured result produced here.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::task::Tags;
use crate::types::ActorId;

// ---------------------------------------------------------------------------
// ActorRole
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    HeadChef,
    SousChef,
    LineCook,
    PrepCook,
    PastryChef,
    GrillCook,
    Expediter,
    Dishwasher,
    KitchenPorter,
}

impl ActorRole {
    pub fn all() -> &'static [ActorRole] {
        &[
            ActorRole::HeadChef,
            ActorRole::SousChef,
            ActorRole::LineCook,
            ActorRole::PrepCook,
            ActorRole::PastryChef,
            ActorRole::GrillCook,
            ActorRole::Expediter,
            ActorRole::Dishwasher,
            ActorRole::KitchenPorter,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActorRole::HeadChef => "head_chef",
            ActorRole::SousChef => "sous_chef",
            ActorRole::LineCook => "line_cook",
            ActorRole::PrepCook => "prep_cook",
            ActorRole::PastryChef => "pastry_chef",
            ActorRole::GrillCook => "grill_cook",
            ActorRole::Expediter => "expediter",
            ActorRole::Dishwasher => "dishwasher",
            ActorRole::KitchenPorter => "kitchen_porter",
        }
    }

    /// Leads may delegate and are asked first during a crisis.
    pub fn is_lead(self) -> bool {
        matches!(self, ActorRole::HeadChef | ActorRole::SousChef)
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        ActorRole::all()
            .iter()
            .copied()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| format!("unknown role: {s}"))
    }
}

// ---------------------------------------------------------------------------
// ActionKind / ActionResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Cook,
    Prep,
    Move,
    GetIngredient,
    UseEquipment,
    Clean,
    Communicate,
    Collaborate,
    Delegate,
    Plate,
    Wait,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Cook => "cook",
            ActionKind::Prep => "prep",
            ActionKind::Move => "move",
            ActionKind::GetIngredient => "get_ingredient",
            ActionKind::UseEquipment => "use_equipment",
            ActionKind::Clean => "clean",
            ActionKind::Communicate => "communicate",
            ActionKind::Collaborate => "collaborate",
            ActionKind::Delegate => "delegate",
            ActionKind::Plate => "plate",
            ActionKind::Wait => "wait",
        }
    }

    /// Kinds that count towards inter-actor communication.
    pub fn is_social(self) -> bool {
        matches!(
            self,
            ActionKind::Communicate | ActionKind::Collaborate | ActionKind::Delegate
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured result of one actor call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub kind: ActionKind,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ActorId>,
    /// Self-assessed quality in `[0, 1]`, if the actor offers one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

impl ActionResult {
    pub fn new(kind: ActionKind, summary: impl Into<String>) -> Self {
        Self {
            kind,
            summary: summary.into(),
            recipient: None,
            quality: None,
            tags: Tags::new(),
        }
    }

    pub fn to(mut self, recipient: impl Into<ActorId>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = Some(quality.clamp(0.0, 1.0));
        self
    }
}

// ---------------------------------------------------------------------------
// parse_action
// ---------------------------------------------------------------------------

const SUMMARY_LIMIT: usize = 200;

fn keyword_table() -> &'static [(Regex, ActionKind)] {
    static TABLE: OnceLock<Vec<(Regex, ActionKind)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        [
            (r"(?i)\b(cook|cooking|prepare|sear)\b", ActionKind::Cook),
            (r"(?i)\b(chop|dice|slice|mince|prep)\b", ActionKind::Prep),
            (r"(?i)\b(move|go to|head to)\b", ActionKind::Move),
            (r"(?i)\b(get|fetch|grab)\b", ActionKind::GetIngredient),
            (r"(?i)\b(plate|garnish)\b", ActionKind::Plate),
            (r"(?i)\b(clean|wipe|sanitize|wash)\b", ActionKind::Clean),
            (r"(?i)\b(use|operate)\b", ActionKind::UseEquipment),
            (r"(?i)\b(help|assist)\b", ActionKind::Collaborate),
            (r"(?i)\bdelegate\b", ActionKind::Delegate),
            (r"(?i)\bwait\b", ActionKind::Wait),
        ]
        .into_iter()
        .map(|(pattern, kind)| (Regex::new(pattern).unwrap(), kind))
        .collect()
    })
}

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@([A-Za-z0-9_\-]+)").unwrap())
}

/// Classify free text into an `ActionResult`.
///
/// The first matching keyword wins. `delegate` is honoured only for lead
/// roles; anyone else delegating is merely communicating. Text with no
/// recognised keyword is communication. An `@name` mention sets the recipient.
pub fn parse_action(text: &str, role: ActorRole) -> ActionResult {
    let kind = keyword_table()
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, kind)| *kind)
        .map(|kind| match kind {
            ActionKind::Delegate if !role.is_lead() => ActionKind::Communicate,
            other => other,
        })
        .unwrap_or(ActionKind::Communicate);

    let summary: String = text.trim().chars().take(SUMMARY_LIMIT).collect();
    let mut result = ActionResult::new(kind, summary);
    if let Some(caps) = mention_re().captures(text) {
        result.recipient = Some(ActorId::new(&caps[1]));
    }
    result.tags.insert("role", role.as_str());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_map_to_kinds() {
        let cases = [
            ("I will cook the risotto", ActionKind::Cook),
            ("Prepare the sauce base", ActionKind::Cook),
            ("Go to the grill station", ActionKind::Move),
            ("Fetch more onions", ActionKind::GetIngredient),
            ("Clean the flat top", ActionKind::Clean),
            ("Can you assist with the sauce?", ActionKind::Collaborate),
            ("Plate table four", ActionKind::Plate),
            ("Let me help you", ActionKind::Collaborate),
            ("Orders are flowing nicely", ActionKind::Communicate),
        ];
        for (text, expected) in cases {
            assert_eq!(parse_action(text, ActorRole::LineCook).kind, expected, "{text}");
        }
    }

    #[test]
    fn keywords_respect_word_boundaries() {
        // "together" contains "get" but is not a fetch.
        let result = parse_action("Working together on this", ActorRole::LineCook);
        assert_eq!(result.kind, ActionKind::Communicate);
    }

    #[test]
    fn delegate_requires_lead_role() {
        let text = "I delegate the fish to @marco";
        assert_eq!(parse_action(text, ActorRole::HeadChef).kind, ActionKind::Delegate);
        assert_eq!(parse_action(text, ActorRole::SousChef).kind, ActionKind::Delegate);
        assert_eq!(parse_action(text, ActorRole::LineCook).kind, ActionKind::Communicate);
    }

    #[test]
    fn mention_sets_recipient() {
        let result = parse_action("@chef_2 need backup on fries", ActorRole::GrillCook);
        assert_eq!(result.recipient, Some(ActorId::from("chef_2")));
        assert_eq!(result.tags.get("role"), Some("grill_cook"));
    }

    #[test]
    fn role_parses_loosely() {
        assert_eq!("Head Chef".parse::<ActorRole>().unwrap(), ActorRole::HeadChef);
        assert_eq!("kitchen-porter".parse::<ActorRole>().unwrap(), ActorRole::KitchenPorter);
        assert!("sommelier".parse::<ActorRole>().is_err());
    }
}
