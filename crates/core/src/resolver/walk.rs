//! Per-node resolution
//!
//! A walk visits one entity at one scope:
//!
//! ```text
//! special permissions (players) ─► self literals ─► scope fallback ─► inherited groups
//! ```
//!
//! The first step producing a definite answer ends the walk for that node.
//! Groups already on the current inheritance path are skipped, so cyclic
//! graphs terminate.

use permrs_sdk::ServerWorldKey;

use super::trace::{attach, note, open, TraceNode};
use crate::permissions::{classify, MatchFlags, SpecialPermissions};
use crate::reader::{AffixKind, CachedGroup, CachedPlayer, EntityData, GroupSnapshot};

/// Tri-state resolution result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Granted,
    Revoked,
    /// No data found, or an unsolvable conflict
    Undefined,
}

impl Resolution {
    pub fn from_bool(granted: bool) -> Self {
        if granted {
            Resolution::Granted
        } else {
            Resolution::Revoked
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Resolution::Granted => Some(true),
            Resolution::Revoked => Some(false),
            Resolution::Undefined => None,
        }
    }

    pub fn is_undefined(self) -> bool {
        self == Resolution::Undefined
    }

    fn verdict(self) -> &'static str {
        match self {
            Resolution::Granted => "granted",
            Resolution::Revoked => "revoked",
            Resolution::Undefined => "undefined",
        }
    }
}

/// Answer for one node plus whether any conflict was seen below it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub resolution: Resolution,
    pub conflict: bool,
}

impl Outcome {
    const UNDEFINED: Outcome = Outcome {
        resolution: Resolution::Undefined,
        conflict: false,
    };

    fn definite(granted: bool) -> Self {
        Self {
            resolution: Resolution::from_bool(granted),
            conflict: false,
        }
    }
}

/// Entity being visited
#[derive(Clone, Copy)]
pub(crate) enum Node<'a> {
    Player(&'a CachedPlayer),
    Group(&'a CachedGroup),
}

impl<'a> Node<'a> {
    fn data(&self) -> &'a EntityData {
        match self {
            Node::Player(player) => &player.data,
            Node::Group(group) => &group.data,
        }
    }

    pub(crate) fn label(&self) -> String {
        match self {
            Node::Player(player) => format!("player '{}'", player.id),
            Node::Group(group) if group.placeholder => format!("group '{}' (no data)", group.name()),
            Node::Group(group) => format!("group '{}'", group.name()),
        }
    }
}

/// State shared by every node of one top-level query
pub(crate) struct Walk<'a> {
    snapshot: &'a GroupSnapshot,
    specials: &'a SpecialPermissions,
    /// Groups on the current inheritance path
    path: Vec<&'a str>,
}

impl<'a> Walk<'a> {
    pub(crate) fn new(snapshot: &'a GroupSnapshot, specials: &'a SpecialPermissions) -> Self {
        Self {
            snapshot,
            specials,
            path: Vec::new(),
        }
    }

    /// Mark a group as being on the path before walking it
    pub(crate) fn enter(&mut self, node: Node<'a>) {
        if let Node::Group(group) = node {
            self.path.push(group.name());
        }
    }

    fn parents(&self, node: Node<'a>) -> Vec<&'a CachedGroup> {
        match node {
            Node::Player(player) => player.groups.iter().map(|g| g.as_ref()).collect(),
            Node::Group(group) => self
                .snapshot
                .parents(group)
                .map(|g| g.as_ref())
                .collect(),
        }
    }

    /// Resolve a positive literal on one node
    ///
    /// `inherit` is false for scope fallback sub-walks, which only look at
    /// special permissions and self data.
    pub(crate) fn permission(
        &mut self,
        node: Node<'a>,
        literal: &str,
        scope: &ServerWorldKey,
        inherit: bool,
        mut trace: Option<&mut TraceNode>,
    ) -> Outcome {
        // Special permissions
        if let Node::Player(player) = node {
            if let Some(hit) = self.specials.evaluate(player, literal, scope) {
                note(&mut trace, || {
                    format!(
                        "special permission '{}': {}",
                        hit.name,
                        Resolution::from_bool(hit.granted).verdict()
                    )
                });
                return Outcome::definite(hit.granted);
            }
        }

        // Self literals at exactly this scope
        let matches = classify(node.data().permissions_at(scope), literal);
        for (stored, flag) in &matches.literals {
            note(&mut trace, || format!("matched '{}' ({})", stored, describe(*flag)));
        }
        let mut outcome = decide_self(matches.flags, &mut trace);

        // Scope fallback
        if outcome.resolution.is_undefined() {
            if let Some(wider) = scope.fallback() {
                let mut child = open(&trace, || format!("fallback to {}", wider));
                let fallback = self.permission(node, literal, &wider, false, child.as_mut());
                attach(&mut trace, child);

                outcome.conflict |= fallback.conflict;
                if !fallback.resolution.is_undefined() {
                    outcome.resolution = fallback.resolution;
                }
            }
        }

        // Inheritance
        if outcome.resolution.is_undefined() && inherit {
            let inherited = self.inherited_permission(node, literal, scope, &mut trace);
            outcome.conflict |= inherited.conflict;
            outcome.resolution = inherited.resolution;
        }

        note(&mut trace, || format!("result: {}", outcome.resolution.verdict()));
        outcome
    }

    fn inherited_permission(
        &mut self,
        node: Node<'a>,
        literal: &str,
        scope: &ServerWorldKey,
        trace: &mut Option<&mut TraceNode>,
    ) -> Outcome {
        let mut granted = false;
        let mut revoked = false;
        let mut conflict = false;

        for parent in self.parents(node) {
            if self.path.contains(&parent.name()) {
                note(trace, || format!("group '{}' skipped (inheritance cycle)", parent.name()));
                continue;
            }

            let child_node = Node::Group(parent);
            let mut child = open(trace, || child_node.label());
            self.path.push(parent.name());
            let result = self.permission(child_node, literal, scope, true, child.as_mut());
            self.path.pop();
            attach(trace, child);

            conflict |= result.conflict;
            match result.resolution {
                Resolution::Granted => granted = true,
                Resolution::Revoked => revoked = true,
                Resolution::Undefined => {}
            }
        }

        let resolution = match (granted, revoked) {
            (true, false) => Resolution::Granted,
            (false, true) => Resolution::Revoked,
            (true, true) => {
                conflict = true;
                note(trace, || {
                    "conflict: inherited groups both grant and revoke".to_string()
                });
                Resolution::Undefined
            }
            (false, false) => Resolution::Undefined,
        };
        Outcome {
            resolution,
            conflict,
        }
    }

    /// Resolve a prefix or suffix on one node
    ///
    /// Returns the value plus whether a conflict was seen below the node.
    pub(crate) fn affix(
        &mut self,
        node: Node<'a>,
        kind: AffixKind,
        mut trace: Option<&mut TraceNode>,
    ) -> (Option<String>, bool) {
        if let Some(value) = node.data().affix(kind) {
            note(&mut trace, || format!("self {}: '{}'", kind.as_str(), value));
            return (Some(value.to_string()), false);
        }

        let mut values: Vec<String> = Vec::new();
        let mut conflict = false;
        for parent in self.parents(node) {
            if self.path.contains(&parent.name()) {
                note(&mut trace, || format!("group '{}' skipped (inheritance cycle)", parent.name()));
                continue;
            }

            let child_node = Node::Group(parent);
            let mut child = open(&trace, || child_node.label());
            self.path.push(parent.name());
            let (value, child_conflict) = self.affix(child_node, kind, child.as_mut());
            self.path.pop();
            attach(&mut trace, child);

            conflict |= child_conflict;
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }

        match values.len() {
            0 => (None, conflict),
            1 => {
                let value = values.remove(0);
                note(&mut trace, || format!("inherited {}: '{}'", kind.as_str(), value));
                (Some(value), conflict)
            }
            _ => {
                note(&mut trace, || {
                    format!(
                        "conflict: inherited groups define different {}es: {}",
                        kind.as_str(),
                        values
                            .iter()
                            .map(|v| format!("'{}'", v))
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                });
                (None, true)
            }
        }
    }
}

/// Decide a node's answer from its own matched literal classes
fn decide_self(flags: MatchFlags, trace: &mut Option<&mut TraceNode>) -> Outcome {
    let explicit_granted = flags.contains(MatchFlags::EXPLICIT_GRANTED);
    let explicit_revoked = flags.contains(MatchFlags::EXPLICIT_REVOKED);
    let wildcard_granted = flags.contains(MatchFlags::WILDCARD_GRANTED);
    let wildcard_revoked = flags.contains(MatchFlags::WILDCARD_REVOKED);

    if explicit_granted != explicit_revoked {
        let mut outcome = Outcome::definite(explicit_granted);
        if wildcard_granted && wildcard_revoked {
            outcome.conflict = true;
            note(trace, || {
                "conflict: self explicit permission defined but conflict between self wildcard permissions"
                    .to_string()
            });
        } else if (explicit_granted && wildcard_granted) || (explicit_revoked && wildcard_revoked) {
            outcome.conflict = true;
            note(trace, || {
                "conflict: unnecessary explicit permission already granted by wildcard".to_string()
            });
        }
        return outcome;
    }

    if explicit_granted && explicit_revoked {
        note(trace, || {
            "conflict: self explicit permission both granted and revoked".to_string()
        });
        return Outcome {
            conflict: true,
            ..Outcome::UNDEFINED
        };
    }

    if wildcard_granted != wildcard_revoked {
        return Outcome::definite(wildcard_granted);
    }

    if wildcard_granted && wildcard_revoked {
        note(trace, || {
            "conflict: self wildcard permission both granted and revoked".to_string()
        });
        return Outcome {
            conflict: true,
            ..Outcome::UNDEFINED
        };
    }

    Outcome::UNDEFINED
}

fn describe(flag: MatchFlags) -> String {
    let mut parts = Vec::new();
    if flag.contains(MatchFlags::EXPLICIT_GRANTED) {
        parts.push("explicit grant");
    }
    if flag.contains(MatchFlags::EXPLICIT_REVOKED) {
        parts.push("explicit revoke");
    }
    if flag.contains(MatchFlags::WILDCARD_GRANTED) {
        parts.push("wildcard grant");
    }
    if flag.contains(MatchFlags::WILDCARD_REVOKED) {
        parts.push("wildcard revoke");
    }
    parts.join(", ")
}
