//! Character sheets.
//!
//! A sheet is one of two closed shapes selected by the `sheetType`
//! discriminator. Vitals code always matches on the variant; a `STANDARD`
//! field is never looked up on a `ROLE_AND_ROLL` sheet or the other way round.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::campaign::GameSystem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sheetType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CharacterSheet {
    Standard(StandardSheet),
    RoleAndRoll(RoleAndRollSheet),
}

/// Classic hit points / mana sheet with attribute scores (STR, DEX, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardSheet {
    pub hp: i32,
    pub max_hp: i32,
    #[serde(default)]
    pub mp: i32,
    #[serde(default)]
    pub max_mp: i32,
    #[serde(default)]
    pub will_power: i32,
    #[serde(default)]
    pub attributes: BTreeMap<String, i32>,
}

/// Role & Roll sheet: pooled-dice attributes and abilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAndRollSheet {
    pub vitals: RoleAndRollVitals,
    #[serde(default)]
    pub attributes: BTreeMap<String, i32>,
    #[serde(default)]
    pub abilities: BTreeMap<String, i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAndRollVitals {
    pub health: i32,
    pub mental: i32,
    #[serde(default)]
    pub will_power: i32,
}

/// Vitals delta carried by a `STATS_UPDATE` event.
///
/// `hp`/`mp` only apply to `STANDARD` sheets, `health`/`mental` only to
/// `ROLE_AND_ROLL` sheets; `willPower` exists on both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hp: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mp: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub will_power: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mental: Option<i32>,
}

impl StatsDelta {
    pub fn is_empty(&self) -> bool {
        self.hp.is_none()
            && self.mp.is_none()
            && self.will_power.is_none()
            && self.health.is_none()
            && self.mental.is_none()
    }
}

/// One displayable vital: label, current value and optional maximum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vital {
    pub label: &'static str,
    pub current: i32,
    pub max: Option<i32>,
}

impl CharacterSheet {
    pub fn system(&self) -> GameSystem {
        match self {
            Self::Standard(_) => GameSystem::Standard,
            Self::RoleAndRoll(_) => GameSystem::RoleAndRoll,
        }
    }

    /// Apply a vitals delta, clamping every vital at zero (and at its max
    /// where the sheet has one). Returns whether any value changed.
    pub fn apply_delta(&mut self, delta: &StatsDelta) -> bool {
        match self {
            Self::Standard(sheet) => {
                let before = sheet.clone();
                if let Some(d) = delta.hp {
                    sheet.hp = clamp_vital(sheet.hp, d, Some(sheet.max_hp));
                }
                if let Some(d) = delta.mp {
                    sheet.mp = clamp_vital(sheet.mp, d, Some(sheet.max_mp));
                }
                if let Some(d) = delta.will_power {
                    sheet.will_power = clamp_vital(sheet.will_power, d, None);
                }
                *sheet != before
            }
            Self::RoleAndRoll(sheet) => {
                let before = sheet.vitals;
                let vitals = &mut sheet.vitals;
                if let Some(d) = delta.health {
                    vitals.health = clamp_vital(vitals.health, d, None);
                }
                if let Some(d) = delta.mental {
                    vitals.mental = clamp_vital(vitals.mental, d, None);
                }
                if let Some(d) = delta.will_power {
                    vitals.will_power = clamp_vital(vitals.will_power, d, None);
                }
                sheet.vitals != before
            }
        }
    }

    pub fn vitals(&self) -> Vec<Vital> {
        match self {
            Self::Standard(sheet) => vec![
                Vital {
                    label: "HP",
                    current: sheet.hp,
                    max: Some(sheet.max_hp),
                },
                Vital {
                    label: "MP",
                    current: sheet.mp,
                    max: Some(sheet.max_mp),
                },
                Vital {
                    label: "WP",
                    current: sheet.will_power,
                    max: None,
                },
            ],
            Self::RoleAndRoll(sheet) => vec![
                Vital {
                    label: "Health",
                    current: sheet.vitals.health,
                    max: None,
                },
                Vital {
                    label: "Mental",
                    current: sheet.vitals.mental,
                    max: None,
                },
                Vital {
                    label: "WP",
                    current: sheet.vitals.will_power,
                    max: None,
                },
            ],
        }
    }

    /// Compact one-line vitals summary, e.g. `HP 5/10 MP 0/4 WP 2`.
    pub fn vitals_summary(&self) -> String {
        self.vitals()
            .iter()
            .map(|v| match v.max {
                Some(max) => format!("{} {}/{}", v.label, v.current, max),
                None => format!("{} {}", v.label, v.current),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn clamp_vital(current: i32, delta: i32, max: Option<i32>) -> i32 {
    let value = current.saturating_add(delta).max(0);
    match max {
        Some(max) if max > 0 => value.min(max),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard(hp: i32, max_hp: i32) -> CharacterSheet {
        CharacterSheet::Standard(StandardSheet {
            hp,
            max_hp,
            mp: 3,
            max_mp: 5,
            will_power: 2,
            attributes: BTreeMap::from([("STR".to_string(), 3)]),
        })
    }

    fn role_and_roll() -> CharacterSheet {
        CharacterSheet::RoleAndRoll(RoleAndRollSheet {
            vitals: RoleAndRollVitals {
                health: 4,
                mental: 3,
                will_power: 1,
            },
            attributes: BTreeMap::new(),
            abilities: BTreeMap::new(),
        })
    }

    #[test]
    fn huge_negative_delta_clamps_hp_at_zero() {
        let mut sheet = standard(5, 10);
        sheet.apply_delta(&StatsDelta {
            hp: Some(-9999),
            ..Default::default()
        });

        let CharacterSheet::Standard(s) = sheet else {
            panic!("expected standard sheet");
        };
        assert_eq!(s.hp, 0);
    }

    #[test]
    fn healing_clamps_at_max_hp() {
        let mut sheet = standard(8, 10);
        sheet.apply_delta(&StatsDelta {
            hp: Some(50),
            ..Default::default()
        });

        let CharacterSheet::Standard(s) = sheet else {
            panic!("expected standard sheet");
        };
        assert_eq!(s.hp, 10);
    }

    #[test]
    fn standard_fields_do_not_touch_role_and_roll_vitals() {
        let mut sheet = role_and_roll();
        let changed = sheet.apply_delta(&StatsDelta {
            hp: Some(-3),
            mp: Some(-1),
            ..Default::default()
        });

        assert!(!changed);
        assert_eq!(sheet, role_and_roll());
    }

    #[test]
    fn role_and_roll_vitals_clamp_at_zero() {
        let mut sheet = role_and_roll();
        sheet.apply_delta(&StatsDelta {
            health: Some(-10),
            mental: Some(2),
            will_power: Some(-1),
            ..Default::default()
        });

        let CharacterSheet::RoleAndRoll(s) = sheet else {
            panic!("expected role and roll sheet");
        };
        assert_eq!(s.vitals.health, 0);
        assert_eq!(s.vitals.mental, 5);
        assert_eq!(s.vitals.will_power, 0);
    }

    #[test]
    fn sheet_type_discriminator_selects_variant() {
        let sheet: CharacterSheet = serde_json::from_str(
            r#"{"sheetType":"ROLE_AND_ROLL","vitals":{"health":3,"mental":2,"willPower":1},"abilities":{"Stealth":2}}"#,
        )
        .unwrap();
        assert_eq!(sheet.system(), GameSystem::RoleAndRoll);

        let sheet: CharacterSheet =
            serde_json::from_str(r#"{"sheetType":"STANDARD","hp":7,"maxHp":9}"#).unwrap();
        assert_eq!(sheet.vitals_summary(), "HP 7/9 MP 0/0 WP 0");
    }
}
