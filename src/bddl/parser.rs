//! BDDL problem parser.
//!
//! Turns a tokenized problem description into a [`ParsedProblem`]. Input is
//! either raw BDDL text or a pre-parsed JSON document with the same section
//! keys; JSON is accepted verbatim and bypasses tokenization (a trust
//! boundary: JSON input is assumed already well-formed).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::warn;

use crate::bddl::tokenizer::{scan_tokens, Token};
use crate::bddl::types::{
    AngleUnit, CameraSpec, Connective, GoalClause, JitterMode, LightingSpec, ParsedProblem,
    Predicate, RegionSpec, TextureSpec, DEFAULT_FIXTURE_CATEGORY, DEFAULT_OBJECT_CATEGORY,
};
use crate::error::{ConfigError, ParseError};

/// The only planning domain this parser accepts.
pub const DOMAIN_NAME: &str = "robosuite";

/// Parses a problem file. `.json` files are deserialized verbatim; anything
/// else is treated as BDDL text.
pub fn parse_file(path: impl AsRef<Path>) -> Result<ParsedProblem, ParseError> {
    let path = path.as_ref();
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        let contents = fs::read_to_string(path)?;
        let problem: ParsedProblem = serde_json::from_str(&contents)?;
        return Ok(problem);
    }
    let contents = fs::read_to_string(path)?;
    parse_str(&contents)
}

/// Parses BDDL problem text.
pub fn parse_str(source: &str) -> Result<ParsedProblem, ParseError> {
    let mut tokens = scan_tokens(source)?;
    if tokens.is_empty() || tokens.remove(0).as_atom() != Some("define") {
        return Err(ParseError::MissingDefine);
    }

    let mut problem = ParsedProblem {
        problem_name: "unknown".to_string(),
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
    };

    for group in tokens {
        let items = match group.as_list() {
            Some(items) if !items.is_empty() => items,
            _ => {
                return Err(ParseError::MalformedSection {
                    section: "(top level)".to_string(),
                    reason: "expected non-empty parenthesized group".to_string(),
                })
            }
        };
        let tag = items[0].as_atom().unwrap_or_default();
        match tag {
            "problem" => {
                problem.problem_name = last_atom(items, "problem")?;
            }
            ":domain" => {
                let domain = last_atom(items, ":domain")?;
                if domain != DOMAIN_NAME {
                    return Err(ParseError::DomainMismatch {
                        expected: DOMAIN_NAME.to_string(),
                        actual: domain,
                    });
                }
            }
            ":requirements" => {}
            ":objects" => {
                parse_categories(&items[1..], DEFAULT_OBJECT_CATEGORY, &mut problem.objects)?;
            }
            ":fixtures" => {
                parse_categories(&items[1..], DEFAULT_FIXTURE_CATEGORY, &mut problem.fixtures)?;
            }
            ":regions" => {
                parse_regions(&items[1..], &mut problem.regions)?;
            }
            ":textures" => {
                parse_textures(&items[1..], &mut problem.textures)?;
            }
            ":camera" => {
                problem.camera = parse_camera(&items[1..])?;
            }
            ":lighting" => {
                problem.lighting = parse_lighting(&items[1..])?;
            }
            ":obj_of_interest" => {
                for item in &items[1..] {
                    problem
                        .obj_of_interest
                        .push(atom_of(item, ":obj_of_interest")?);
                }
            }
            ":language" => {
                let words: Vec<String> = items[1..]
                    .iter()
                    .map(|item| atom_of(item, ":language"))
                    .collect::<Result<_, _>>()?;
                problem.language_instruction = words.join(" ");
            }
            ":init" => {
                for item in &items[1..] {
                    problem.initial_state.push(parse_predicate(item)?);
                }
            }
            ":goal" => {
                let body = items.get(1).ok_or_else(|| ParseError::MalformedSection {
                    section: ":goal".to_string(),
                    reason: "missing goal expression".to_string(),
                })?;
                problem.goal_state = package_goal(body)?;
            }
            ":demonstration" => {
                for item in &items[1..] {
                    problem.demonstration_states.push(parse_predicate(item)?);
                }
            }
            other => {
                // forward-compatibility: unknown sections are skipped, not fatal
                warn!(section = other, "section not recognized in problem");
            }
        }
    }

    Ok(problem)
}

/// Checks that every entity referenced by a state predicate is declared.
///
/// Deferring this to a lookup failure at evaluation time would let authoring
/// errors into collected episodes; failing at construction keeps them out.
pub fn validate_problem(problem: &ParsedProblem) -> Result<(), ConfigError> {
    let sections: [(&str, Box<dyn Iterator<Item = &Predicate>>); 3] = [
        ("initial_state", Box::new(problem.initial_state.iter())),
        (
            "goal_state",
            Box::new(problem.goal_state.iter().map(|c| &c.predicate)),
        ),
        (
            "demonstration_states",
            Box::new(problem.demonstration_states.iter()),
        ),
    ];
    for (section, predicates) in sections {
        for predicate in predicates {
            for arg in &predicate.args {
                if !problem.resolves(arg) {
                    return Err(ConfigError::UnresolvedEntity {
                        name: arg.clone(),
                        section: section.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn atom_of(token: &Token, section: &str) -> Result<String, ParseError> {
    token
        .as_atom()
        .map(str::to_string)
        .ok_or_else(|| ParseError::MalformedSection {
            section: section.to_string(),
            reason: "expected atom, found group".to_string(),
        })
}

fn last_atom(items: &[Token], section: &str) -> Result<String, ParseError> {
    items
        .last()
        .and_then(|t| t.as_atom())
        .map(str::to_string)
        .ok_or_else(|| ParseError::MalformedSection {
            section: section.to_string(),
            reason: "expected trailing atom".to_string(),
        })
}

/// Accumulates a flat name list until a `-` separator; the token after the
/// separator is the category key. Names left unterminated default into the
/// implicit category.
fn parse_categories(
    items: &[Token],
    default_category: &str,
    out: &mut BTreeMap<String, Vec<String>>,
) -> Result<(), ParseError> {
    let mut pending: Vec<String> = Vec::new();
    let mut iter = items.iter();
    while let Some(item) = iter.next() {
        let name = atom_of(item, ":objects/:fixtures")?;
        if name == "-" {
            let category = iter
                .next()
                .and_then(|t| t.as_atom())
                .map(str::to_string)
                .ok_or_else(|| ParseError::MalformedSection {
                    section: ":objects/:fixtures".to_string(),
                    reason: "dangling '-' separator with no category".to_string(),
                })?;
            out.entry(category)
                .or_default()
                .append(&mut pending);
        } else {
            pending.push(name);
        }
    }
    if !pending.is_empty() {
        out.entry(default_category.to_string())
            .or_default()
            .append(&mut pending);
    }
    Ok(())
}

fn parse_regions(
    items: &[Token],
    out: &mut BTreeMap<String, RegionSpec>,
) -> Result<(), ParseError> {
    for group in items {
        let parts = group
            .as_list()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ParseError::MalformedSection {
                section: ":regions".to_string(),
                reason: "expected (name (:target ...) ...) group".to_string(),
            })?;
        let region_name = atom_of(&parts[0], ":regions")?;
        let mut spec = RegionSpec {
            target: String::new(),
            ranges: Vec::new(),
            yaw_rotation: (0.0, 0.0),
            rgba: [0.0; 4],
        };
        for prop in &parts[1..] {
            let prop_items = match prop.as_list() {
                Some(p) if p.len() >= 2 => p,
                _ => continue,
            };
            match prop_items[0].as_atom() {
                Some(":target") => spec.target = atom_of(&prop_items[1], ":regions")?,
                Some(":ranges") => spec.ranges = parse_rows::<4>(&prop_items[1], ":regions")?,
                Some(":yaw_rotation") => {
                    let rows = parse_rows::<2>(&prop_items[1], ":regions")?;
                    if let Some(row) = rows.first() {
                        spec.yaw_rotation = (row[0], row[1]);
                    }
                }
                Some(":rgba") => {
                    let row = parse_row::<4>(&prop_items[1], ":regions")?;
                    spec.rgba = row;
                }
                _ => {}
            }
        }
        out.insert(region_name, spec);
    }
    Ok(())
}

fn parse_textures(
    items: &[Token],
    out: &mut BTreeMap<String, TextureSpec>,
) -> Result<(), ParseError> {
    for group in items {
        let parts = group
            .as_list()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ParseError::MalformedSection {
                section: ":textures".to_string(),
                reason: "expected (name (:type ...) ...) group".to_string(),
            })?;
        let target = atom_of(&parts[0], ":textures")?;
        let mut spec = TextureSpec {
            texture_type: String::new(),
            hsv: Vec::new(),
            turbulence: None,
            sigma: None,
        };
        for prop in &parts[1..] {
            let prop_items = match prop.as_list() {
                Some(p) if p.len() >= 2 => p,
                _ => continue,
            };
            match prop_items[0].as_atom() {
                Some(":type") => spec.texture_type = atom_of(&prop_items[1], ":textures")?,
                Some(":hsv") => spec.hsv = parse_rows::<6>(&prop_items[1], ":textures")?,
                Some(":turbulence") => spec.turbulence = Some(prop_items[1].as_number()?),
                Some(":sigma") => spec.sigma = Some(prop_items[1].as_number()?),
                _ => {}
            }
        }
        out.insert(target, spec);
    }
    Ok(())
}

fn parse_camera(items: &[Token]) -> Result<CameraSpec, ParseError> {
    let mut camera = CameraSpec::default();
    let mut jitter_mode = "uniform".to_string();
    let mut unit = "radians".to_string();
    for prop in items {
        let prop_items = match prop.as_list() {
            Some(p) if p.len() >= 2 => p,
            _ => continue,
        };
        match prop_items[0].as_atom() {
            Some(":ranges") => camera.ranges = parse_rows::<6>(&prop_items[1], ":camera")?,
            Some(":jitter_mode") => jitter_mode = atom_of(&prop_items[1], ":camera")?,
            Some(":unit") => unit = atom_of(&prop_items[1], ":camera")?,
            _ => {}
        }
    }
    camera.jitter_mode = match jitter_mode.as_str() {
        "uniform" => JitterMode::Uniform,
        "normal" => JitterMode::Normal,
        other => return Err(ConfigError::UnsupportedJitterMode(other.to_string()).into()),
    };
    camera.unit = match unit.as_str() {
        "radians" => AngleUnit::Radians,
        "degrees" => AngleUnit::Degrees,
        other => return Err(ConfigError::UnsupportedUnit(other.to_string()).into()),
    };
    Ok(camera)
}

fn parse_lighting(items: &[Token]) -> Result<LightingSpec, ParseError> {
    let mut lighting = LightingSpec::default();
    for prop in items {
        let prop_items = match prop.as_list() {
            Some(p) if p.len() >= 2 => p,
            _ => continue,
        };
        match prop_items[0].as_atom() {
            Some(":shadow") => {
                lighting.shadow = prop_items[1].as_atom() == Some("true");
            }
            Some(":source") => {
                lighting.source = parse_rows::<6>(&prop_items[1], ":lighting")?;
            }
            _ => {}
        }
    }
    Ok(lighting)
}

/// Flattens the goal expression one level into connective/predicate pairs.
///
/// A leading `and`/`or` distributes over the group's predicates; a bare
/// predicate group becomes a single implicit-`and` clause. Exactly one
/// leading connective is supported; deeper nesting is unsupported input.
fn package_goal(body: &Token) -> Result<Vec<GoalClause>, ParseError> {
    let items = body
        .as_list()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| ParseError::MalformedSection {
            section: ":goal".to_string(),
            reason: "expected parenthesized goal expression".to_string(),
        })?;

    if let Some(connective) = items[0].as_atom().and_then(Connective::from_token) {
        items[1..]
            .iter()
            .map(|item| {
                Ok(GoalClause {
                    connective,
                    predicate: parse_predicate(item)?,
                })
            })
            .collect()
    } else {
        Ok(vec![GoalClause {
            connective: Connective::And,
            predicate: parse_predicate(body)?,
        }])
    }
}

fn parse_predicate(token: &Token) -> Result<Predicate, ParseError> {
    let items = token
        .as_list()
        .ok_or_else(|| ParseError::MalformedPredicate(format!("{:?}", token)))?;
    let atoms: Vec<String> = items
        .iter()
        .map(|item| {
            item.as_atom()
                .map(str::to_string)
                .ok_or_else(|| ParseError::MalformedPredicate(format!("{:?}", token)))
        })
        .collect::<Result<_, _>>()?;
    Predicate::try_from(atoms).map_err(ParseError::MalformedPredicate)
}

fn parse_row<const N: usize>(token: &Token, section: &str) -> Result<[f64; N], ParseError> {
    let items = token
        .as_list()
        .ok_or_else(|| ParseError::MalformedSection {
            section: section.to_string(),
            reason: format!("expected {N}-element numeric group"),
        })?;
    if items.len() != N {
        return Err(ParseError::MalformedSection {
            section: section.to_string(),
            reason: format!("expected {N} numbers, got {}", items.len()),
        });
    }
    let mut row = [0.0; N];
    for (slot, item) in row.iter_mut().zip(items) {
        *slot = item.as_number()?;
    }
    Ok(row)
}

fn parse_rows<const N: usize>(token: &Token, section: &str) -> Result<Vec<[f64; N]>, ParseError> {
    let rows = token
        .as_list()
        .ok_or_else(|| ParseError::MalformedSection {
            section: section.to_string(),
            reason: "expected group of numeric ranges".to_string(),
        })?;
    rows.iter().map(|row| parse_row::<N>(row, section)).collect()
}
