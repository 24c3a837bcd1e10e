use async_trait::async_trait;

use crate::{
    types::{Plan, Popularity},
    utils::contains_phrase,
};

use super::{PlanDraft, PlanError, PlanProvider};

/// Genre vocabulary: trigger phrases and the seed genres they map to.
const GENRES: &[(&[&str], &[&str])] = &[
    (
        &["funk", "funky", "nu disco", "nudisco", "groove", "groovy", "p-funk", "g-funk"],
        &["funk", "disco", "soul"],
    ),
    (&["disco"], &["disco", "funk"]),
    (
        &["house", "french house", "filter house", "electro house"],
        &["house", "deep-house", "dance"],
    ),
    (&["techno", "hard techno", "indus"], &["techno", "minimal-techno"]),
    (&["hip hop", "hip-hop", "hiphop"], &["hip-hop"]),
    (&["jazz"], &["jazz"]),
    (&["rock"], &["rock"]),
    (&["reggae"], &["reggae"]),
    (&["ambient", "downtempo", "lofi", "lo-fi"], &["ambient", "chill"]),
];

const FRENCH_RAP: &[&str] = &["french rap", "rap fr", "rap français", "rap francais", "rapfr"];
const FRENCH_RAP_GENRES: &[&str] = &["french hip hop", "rap francais", "pop urbaine", "rap"];
const FRENCH_RAP_ARTISTS: &[&str] = &[
    "GIMS", "Niska", "PNL", "Booba", "SCH", "Bigflo & Oli", "IAM", "Naps", "Soso Maness", "Jul",
    "Ninho",
];

/// Well-known names pulled in as artist seeds for the funk family.
const FUNK_ARTISTS: &[&str] = &[
    "Daft Punk",
    "Jamiroquai",
    "Chromeo",
    "Parcels",
    "Nile Rodgers",
    "Earth, Wind & Fire",
];

const CHILL: &[&str] = &["chill", "calme", "relax", "détente", "downtempo", "lofi", "lo-fi"];
const ENERGETIC: &[&str] = &[
    "punchy", "energetic", "énergie", "energie", "club", "dance", "workout", "gym", "salle",
    "muscu", "banger", "boost",
];

const NEGATIONS: &[&str] = &["no ", "not ", "without ", "pas de ", "sans ", "except ", "no-"];

/// Words that carry no search value on their own.
const STOPWORDS: &[&str] = &[
    "a", "about", "around", "approx", "approximately", "environ", "some", "songs", "song",
    "tracks", "track", "titres", "titre", "morceaux", "playlist", "please", "with", "and", "et",
    "de", "des", "du", "la", "le", "les", "une", "un", "for", "the", "of", "me", "give", "make",
    "i", "want", "need",
];

/// Deterministic keyword planner.
///
/// Reads the prompt clause by clause. Within a clause, the text before a
/// negation ("no", "without", "pas de", "sans") feeds inclusions and the text
/// after it feeds exclusions. Explicit `include:`/`inclure:` lists are artist
/// names; `exclude:`/`exclure:` entries are genres when the vocabulary knows
/// them, artists otherwise. Never returns an empty plan.
pub struct HeuristicPlanner;

impl HeuristicPlanner {
    pub fn plan(prompt: &str, approx_count: Option<u32>) -> Plan {
        let text = prompt.to_lowercase();
        let mut draft = PlanDraft {
            target_count: count_in(&text).or(approx_count),
            ..Default::default()
        };
        let mut keywords = Vec::new();

        let (text, explicit_include) = take_list(&text, &["include:", "inclure:", "inclure"]);
        let (text, explicit_exclude) = take_list(&text, &["exclude:", "exclure:", "exclure"]);
        draft.include_artists.extend(explicit_include);
        for name in explicit_exclude {
            if !exclude_genres_in(&mut draft, &name) {
                draft.exclude_artists.push(name);
            }
        }

        for clause in text.split([',', ';', '.', '\n']) {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            let (wanted, unwanted) = split_negation(clause);
            if !wanted.is_empty() {
                include_clause(&mut draft, &mut keywords, wanted);
            }
            if let Some(unwanted) = unwanted {
                exclude_genres_in(&mut draft, unwanted);
            }
        }

        // genres the user rules out must not come back through the families
        let excluded: Vec<String> = draft.exclude_genres.clone();
        draft.include_genres.retain(|g| !excluded.contains(g));

        if keywords.is_empty()
            && draft.include_genres.is_empty()
            && draft.include_artists.is_empty()
        {
            keywords.push(prompt.trim().to_string());
        }
        draft.keywords = keywords;
        draft.normalize(approx_count)
    }
}

#[async_trait]
impl PlanProvider for HeuristicPlanner {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn propose(&self, prompt: &str, approx_count: Option<u32>) -> Result<Plan, PlanError> {
        Ok(Self::plan(prompt, approx_count))
    }
}

/// Splits a clause at its first negation: what comes before is wanted, the
/// rest is ruled out.
fn split_negation(clause: &str) -> (&str, Option<&str>) {
    let padded = format!(" {clause}");
    let Some(at) = NEGATIONS
        .iter()
        .filter_map(|n| padded.find(&format!(" {n}")))
        .min()
    else {
        return (clause, None);
    };
    // `at` indexes the padded clause, one byte ahead of `clause`
    let (wanted, unwanted) = clause.split_at(at.saturating_sub(1).min(clause.len()));
    (wanted.trim(), Some(unwanted.trim()))
}

fn include_clause(draft: &mut PlanDraft, keywords: &mut Vec<String>, clause: &str) {
    for (triggers, genres) in matching_genres(clause) {
        draft.include_genres.extend(genres.iter().map(|g| g.to_string()));
        if triggers.contains(&"funk") {
            draft
                .include_artists
                .extend(FUNK_ARTISTS.iter().map(|a| a.to_string()));
        }
    }

    if CHILL.iter().any(|w| clause.contains(w)) {
        draft.popularity = Some(Popularity::Niche);
    }
    if ENERGETIC.iter().any(|w| clause.contains(w)) {
        draft.popularity = Some(Popularity::Mainstream);
    }

    let phrase = strip_stopwords(clause);
    if !phrase.is_empty() {
        keywords.push(phrase);
    }
}

/// Adds the genres `text` names to the exclusions. French rap also rules
/// out its best-known artists. Returns whether anything matched.
fn exclude_genres_in(draft: &mut PlanDraft, text: &str) -> bool {
    let mut matched = false;
    if FRENCH_RAP.iter().any(|k| text.contains(k)) {
        draft
            .exclude_genres
            .extend(FRENCH_RAP_GENRES.iter().map(|g| g.to_string()));
        draft
            .exclude_artists
            .extend(FRENCH_RAP_ARTISTS.iter().map(|a| a.to_string()));
        matched = true;
    }
    for (_, genres) in matching_genres(text) {
        draft.exclude_genres.extend(genres.iter().map(|g| g.to_string()));
        matched = true;
    }
    matched
}

fn matching_genres(clause: &str) -> Vec<(&'static [&'static str], &'static [&'static str])> {
    GENRES
        .iter()
        .filter(|(triggers, _)| triggers.iter().any(|t| contains_phrase(clause, t)))
        .copied()
        .collect()
}

/// First standalone integer in the text, if it is a plausible track count.
fn count_in(text: &str) -> Option<u32> {
    text.split(|c: char| !c.is_ascii_digit() && !c.is_alphabetic())
        .filter(|w| !w.is_empty() && w.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|w| w.parse::<u32>().ok())
        .find(|n| (1..=100).contains(n))
}

/// Cuts `marker list.` out of the text and returns the names it listed.
fn take_list(text: &str, markers: &[&str]) -> (String, Vec<String>) {
    let Some((start, marker)) = markers
        .iter()
        .find_map(|m| text.find(m).map(|i| (i, *m)))
    else {
        return (text.to_string(), Vec::new());
    };

    let body_start = start + marker.len();
    let body_end = text[body_start..]
        .find('.')
        .map(|i| body_start + i)
        .unwrap_or(text.len());

    let names = text[body_start..body_end]
        .trim_start_matches([':', '-'])
        .split([',', ';'])
        .flat_map(|part| part.split(" and ").flat_map(|p| p.split(" et ")))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let rest = format!("{}{}", &text[..start], &text[body_end..]);
    (rest, names)
}

fn strip_stopwords(clause: &str) -> String {
    clause
        .split_whitespace()
        .filter(|w| !STOPWORDS.contains(w))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .collect::<Vec<_>>()
        .join(" ")
}
