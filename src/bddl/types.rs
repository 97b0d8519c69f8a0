//! Parsed problem types for BDDL task descriptions.
//!
//! A [`ParsedProblem`] is the immutable result of parsing one task
//! description. It is consumed once by the scene builder at environment
//! construction and on every step by the task domain for goal and subtask
//! checks.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Default category for object names with no trailing `-` separator.
pub const DEFAULT_OBJECT_CATEGORY: &str = "object";

/// Default category for fixture names with no trailing `-` separator.
pub const DEFAULT_FIXTURE_CATEGORY: &str = "fixture";

/// A named boolean relation over simulation entities, arity 1 or 2.
///
/// Args are entity-name strings resolved at evaluation time to live
/// object-state handles. Serialized as a flat list `["on", "obj", "region"]`
/// to match the pre-parsed JSON problem format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Predicate {
    /// Predicate name, matched case-insensitively against the registry.
    pub name: String,
    /// Entity-name arguments; always 1 or 2 entries.
    pub args: Vec<String>,
}

impl Predicate {
    /// Builds a unary predicate.
    pub fn unary(name: impl Into<String>, arg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: vec![arg.into()],
        }
    }

    /// Builds a binary predicate.
    pub fn binary(
        name: impl Into<String>,
        arg1: impl Into<String>,
        arg2: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            args: vec![arg1.into(), arg2.into()],
        }
    }

    /// Number of entity arguments.
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.args.join(" "))
    }
}

impl TryFrom<Vec<String>> for Predicate {
    type Error = String;

    fn try_from(items: Vec<String>) -> Result<Self, Self::Error> {
        if items.len() < 2 || items.len() > 3 {
            return Err(format!(
                "predicate list must have 2 or 3 entries, got {}",
                items.len()
            ));
        }
        let mut iter = items.into_iter();
        let name = iter.next().unwrap_or_default();
        Ok(Self {
            name,
            args: iter.collect(),
        })
    }
}

impl From<Predicate> for Vec<String> {
    fn from(p: Predicate) -> Self {
        let mut items = vec![p.name];
        items.extend(p.args);
        items
    }
}

/// Logical connective joining goal clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connective {
    And,
    Or,
}

impl Connective {
    /// Parses `and`/`or`, returning `None` for anything else.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "and" => Some(Connective::And),
            "or" => Some(Connective::Or),
            _ => None,
        }
    }
}

impl fmt::Display for Connective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connective::And => write!(f, "and"),
            Connective::Or => write!(f, "or"),
        }
    }
}

/// One connective/predicate pair of the flattened goal expression.
///
/// The goal expression is flattened one level into an alternating
/// connective/predicate sequence evaluated two-at-a-time, left to right,
/// with no operator precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalClause {
    pub connective: Connective,
    pub predicate: Predicate,
}

/// A named rectangular placement zone tied to a target entity.
///
/// Used both for static scene decoration (table zones) and as a sampling
/// constraint for initial object placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    /// Entity the region is defined relative to (workspace, object, or fixture).
    pub target: String,
    /// Rectangles `[x_lo, y_lo, x_hi, y_hi]` in the target frame.
    #[serde(default)]
    pub ranges: Vec<[f64; 4]>,
    /// Yaw rotation range `[lo, hi]` in radians applied to placed objects.
    #[serde(default)]
    pub yaw_rotation: (f64, f64),
    /// Zone display color.
    #[serde(default)]
    pub rgba: [f64; 4],
}

/// Texture randomization parameters for one target entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureSpec {
    /// One of `file`, `wood`, `color`, `fractal`, `jitter`.
    pub texture_type: String,
    /// HSV ranges `[h_lo, s_lo, v_lo, h_hi, s_hi, v_hi]`; hue in [0, 179],
    /// saturation and value in [0, 255].
    #[serde(default)]
    pub hsv: Vec<[f64; 6]>,
    /// How quickly low-frequency noise is replaced by high-frequency noise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turbulence: Option<f64>,
    /// Standard deviation of added noise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sigma: Option<f64>,
}

/// How camera pose samples are drawn within their ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterMode {
    #[default]
    Uniform,
    Normal,
}

/// Angle unit for camera pose ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngleUnit {
    #[default]
    Radians,
    Degrees,
}

/// Camera pose randomization ranges in spherical coordinates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraSpec {
    /// Ranges `[r_lo, theta_lo, phi_lo, r_hi, theta_hi, phi_hi]` (physics
    /// convention spherical coordinates).
    #[serde(default)]
    pub ranges: Vec<[f64; 6]>,
    #[serde(default)]
    pub jitter_mode: JitterMode,
    #[serde(default)]
    pub unit: AngleUnit,
}

/// Lighting randomization: shadow flag and light-source direction ranges.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LightingSpec {
    /// Whether the light source casts shadows.
    #[serde(default)]
    pub shadow: bool,
    /// Light source position ranges pointing at the origin, in spherical
    /// coordinates `[r_lo, theta_lo, phi_lo, r_hi, theta_hi, phi_hi]`.
    #[serde(default)]
    pub source: Vec<[f64; 6]>,
}

/// Immutable result of parsing one BDDL task description.
///
/// Every name referenced by `initial_state`, `goal_state`, and
/// `demonstration_states` must resolve to an entry in `objects`, `fixtures`,
/// or `regions`; [`crate::bddl::validate_problem`] enforces this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedProblem {
    pub problem_name: String,
    /// Movable entities, keyed by category.
    #[serde(default)]
    pub objects: BTreeMap<String, Vec<String>>,
    /// Non-movable entities, keyed by category.
    #[serde(default)]
    pub fixtures: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub regions: BTreeMap<String, RegionSpec>,
    #[serde(default)]
    pub textures: BTreeMap<String, TextureSpec>,
    #[serde(default)]
    pub camera: CameraSpec,
    #[serde(default)]
    pub lighting: LightingSpec,
    /// Placement and articulation predicates applied at reset.
    #[serde(default)]
    pub initial_state: Vec<Predicate>,
    /// Flattened goal expression, serialized as the alternating
    /// `["and", ["on", "a", "b"], ...]` list of the JSON problem format.
    #[serde(default, with = "goal_serde")]
    pub goal_state: Vec<GoalClause>,
    /// Ordered subtask-boundary predicates used to segment demonstrations.
    #[serde(default)]
    pub demonstration_states: Vec<Predicate>,
    #[serde(default)]
    pub obj_of_interest: Vec<String>,
    #[serde(default)]
    pub language_instruction: String,
}

impl ParsedProblem {
    /// True if `name` is declared as an object, fixture, or region.
    pub fn resolves(&self, name: &str) -> bool {
        self.regions.contains_key(name)
            || self.objects.values().any(|v| v.iter().any(|n| n == name))
            || self.fixtures.values().any(|v| v.iter().any(|n| n == name))
    }

    /// Category of a declared object or fixture instance, if any.
    pub fn category_of(&self, name: &str) -> Option<&str> {
        for (category, instances) in self.objects.iter().chain(self.fixtures.iter()) {
            if instances.iter().any(|n| n == name) {
                return Some(category);
            }
        }
        None
    }

    /// True if `name` is declared as a fixture instance.
    pub fn is_fixture(&self, name: &str) -> bool {
        self.fixtures.values().any(|v| v.iter().any(|n| n == name))
    }
}

/// Serde adapter for the alternating connective/predicate goal list.
mod goal_serde {
    use super::{Connective, GoalClause, Predicate};
    use serde::de::Error as DeError;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Term {
        Connective(Connective),
        Predicate(Vec<String>),
    }

    pub fn serialize<S: Serializer>(
        clauses: &[GoalClause],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut terms = Vec::with_capacity(clauses.len() * 2);
        for clause in clauses {
            terms.push(Term::Connective(clause.connective));
            terms.push(Term::Predicate(clause.predicate.clone().into()));
        }
        terms.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<GoalClause>, D::Error> {
        let terms = Vec::<Term>::deserialize(deserializer)?;
        if terms.len() % 2 != 0 {
            return Err(D::Error::custom(
                "goal_state must alternate connectives and predicates",
            ));
        }
        let mut clauses = Vec::with_capacity(terms.len() / 2);
        let mut iter = terms.into_iter();
        while let (Some(conn), Some(pred)) = (iter.next(), iter.next()) {
            let connective = match conn {
                Term::Connective(c) => c,
                Term::Predicate(_) => {
                    return Err(D::Error::custom("expected 'and'/'or' connective"))
                }
            };
            let predicate = match pred {
                Term::Predicate(items) => Predicate::try_from(items).map_err(D::Error::custom)?,
                Term::Connective(_) => return Err(D::Error::custom("expected predicate list")),
            };
            clauses.push(GoalClause {
                connective,
                predicate,
            });
        }
        Ok(clauses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicate_roundtrip() {
        let p = Predicate::binary("on", "milk_1", "table_region");
        let json = serde_json::to_string(&p).expect("serialize");
        assert_eq!(json, r#"["on","milk_1","table_region"]"#);
        let back: Predicate = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, p);
    }

    #[test]
    fn test_predicate_rejects_bad_arity() {
        let result: Result<Predicate, _> = serde_json::from_str(r#"["on"]"#);
        assert!(result.is_err());
        let result: Result<Predicate, _> = serde_json::from_str(r#"["on","a","b","c"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_goal_state_json_shape() {
        let problem = ParsedProblem {
            problem_name: "tabletop".to_string(),
            goal_state: vec![
                GoalClause {
                    connective: Connective::And,
                    predicate: Predicate::binary("on", "a", "b"),
                },
                GoalClause {
                    connective: Connective::Or,
                    predicate: Predicate::unary("open", "c"),
                },
            ],
            ..blank_problem()
        };
        let json = serde_json::to_value(&problem).expect("serialize");
        assert_eq!(
            json["goal_state"],
            serde_json::json!(["and", ["on", "a", "b"], "or", ["open", "c"]])
        );
        let back: ParsedProblem = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.goal_state, problem.goal_state);
    }

    #[test]
    fn test_resolves_across_sections() {
        let mut problem = blank_problem();
        problem
            .objects
            .insert("mug".to_string(), vec!["mug_1".to_string()]);
        problem
            .fixtures
            .insert("cabinet".to_string(), vec!["cabinet_1".to_string()]);
        problem.regions.insert(
            "table_zone".to_string(),
            RegionSpec {
                target: "table".to_string(),
                ranges: vec![],
                yaw_rotation: (0.0, 0.0),
                rgba: [0.0; 4],
            },
        );

        assert!(problem.resolves("mug_1"));
        assert!(problem.resolves("cabinet_1"));
        assert!(problem.resolves("table_zone"));
        assert!(!problem.resolves("mug_2"));
        assert_eq!(problem.category_of("mug_1"), Some("mug"));
        assert!(problem.is_fixture("cabinet_1"));
        assert!(!problem.is_fixture("mug_1"));
    }

    fn blank_problem() -> ParsedProblem {
        ParsedProblem {
            problem_name: String::new(),
            objects: BTreeMap::new(),
            fixtures: BTreeMap::new(),
            regions: BTreeMap::new(),
            textures: BTreeMap::new(),
            camera: CameraSpec::default(),
            lighting: LightingSpec::default(),
            initial_state: Vec::new(),
            goal_state: Vec::new(),
            demonstration_states: Vec::new(),
            obj_of_interest: Vec::new(),
            language_instruction: String::new(),
        }
    }
}
