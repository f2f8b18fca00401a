use std::collections::BTreeSet;

use serde_json::Value;

use super::{TextLineSpec, TextLineSpecStore};
use crate::bridge::SelectionKey;
use crate::editor::overrides::{LayerOverrideStore, OverridePaths};

const LEGACY_EPSILON: f64 = 1e-9;

const LEGACY_PATHS: [&str; 3] = [
    OverridePaths::LEGACY_TEXT_OFFSET_X,
    OverridePaths::LEGACY_TEXT_OFFSET_Y,
    OverridePaths::LEGACY_TEXT_SCALE,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MigrationOutcome {
    AlreadyMigrated,
    NothingToMigrate,
    /// Legacy paths existed but held identity values; they were only cleared.
    Cleared,
    Folded {
        offset_x: f64,
        offset_y: f64,
        scale: f64,
        slots: usize,
    },
}

/// One-time fold of the deprecated global text offset/scale overrides into per-slot specs.
///
/// Keyed by selection identity so a selection is never folded twice within a session,
/// regardless of how often it is reloaded.
#[derive(Debug, Clone, Default)]
pub struct LegacyTextMigration {
    migrated: BTreeSet<SelectionKey>,
}

impl LegacyTextMigration {
    pub fn is_migrated(&self, selection: &SelectionKey) -> bool {
        self.migrated.contains(selection)
    }

    pub fn migrate<'a, I>(
        &mut self,
        selection: &SelectionKey,
        slots: I,
        overrides: &mut LayerOverrideStore,
        text_lines: &mut TextLineSpecStore,
    ) -> MigrationOutcome
    where
        I: IntoIterator<Item = &'a str>,
    {
        if !self.migrated.insert(selection.clone()) {
            return MigrationOutcome::AlreadyMigrated;
        }

        let current = overrides.current();
        if !LEGACY_PATHS.iter().any(|path| current.contains(path)) {
            return MigrationOutcome::NothingToMigrate;
        }

        let offset_x = legacy_value(current.get(OverridePaths::LEGACY_TEXT_OFFSET_X), 0.0);
        let offset_y = legacy_value(current.get(OverridePaths::LEGACY_TEXT_OFFSET_Y), 0.0);
        let scale = legacy_value(current.get(OverridePaths::LEGACY_TEXT_SCALE), 1.0);
        let non_default = offset_x.abs() > LEGACY_EPSILON
            || offset_y.abs() > LEGACY_EPSILON
            || (scale - 1.0).abs() > LEGACY_EPSILON;

        let mut folded_slots = 0;
        if non_default {
            let slots: Vec<&str> = slots.into_iter().collect();
            folded_slots = slots.len();
            text_lines.update_all(slots, false, |spec| TextLineSpec {
                offset_x: spec.offset_x + offset_x,
                offset_y: spec.offset_y + offset_y,
                scale: spec.scale * scale,
                ..spec
            });
        }

        overrides.merge_patch(LEGACY_PATHS.map(|path| (path, Value::Null)), false);

        if non_default {
            tracing::info!(
                selection = %selection,
                offset_x,
                offset_y,
                scale,
                slots = folded_slots,
                "folded legacy text overrides into slot specs"
            );
            MigrationOutcome::Folded {
                offset_x,
                offset_y,
                scale,
                slots: folded_slots,
            }
        } else {
            tracing::debug!(selection = %selection, "cleared identity legacy text overrides");
            MigrationOutcome::Cleared
        }
    }
}

fn legacy_value(value: Option<&Value>, identity: f64) -> f64 {
    value
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
        .unwrap_or(identity)
}
