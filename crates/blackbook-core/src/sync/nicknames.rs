//! Nickname equivalence lookup
//!
//! A precomputed bidirectional mapping from normalized given names to
//! their equivalence group ("Bob" and "Robert" land in the same group).
//! Built once on first use and treated as read-only shared data.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Common English nickname groups. Each name appears in exactly one group.
const NICKNAME_GROUPS: &[&[&str]] = &[
    &["robert", "rob", "bob", "bobby", "robbie"],
    &["william", "will", "bill", "billy", "liam"],
    &["elizabeth", "liz", "lizzie", "beth", "betsy", "eliza", "betty"],
    &["margaret", "maggie", "meg", "peggy", "marge"],
    &["james", "jim", "jimmy", "jamie"],
    &["john", "jack", "johnny", "jon"],
    &["michael", "mike", "mikey", "mick"],
    &["richard", "rick", "ricky", "dick", "richie"],
    &["thomas", "tom", "tommy"],
    &["christopher", "chris", "topher", "kit"],
    &["katherine", "kate", "katie", "kathy", "kat", "kitty", "catherine", "cathy"],
    &["jennifer", "jen", "jenny"],
    &["joseph", "joe", "joey"],
    &["daniel", "dan", "danny"],
    &["anthony", "tony"],
    &["edward", "ed", "eddie", "ned"],
    &["theodore", "ted", "teddy", "theo"],
    &["charles", "charlie", "chuck"],
    &["david", "dave", "davey"],
    &["steven", "stephen", "steve", "stevie"],
    &["andrew", "andy", "drew"],
    &["alexander", "alex", "sasha", "xander"],
    &["alexandra", "alexa", "lexi", "sandra", "sandy"],
    &["nicholas", "nick", "nicky"],
    &["samuel", "sam", "sammy"],
    &["benjamin", "ben", "benny", "benji"],
    &["matthew", "matt", "matty"],
    &["patricia", "pat", "patty", "tricia", "trish"],
    &["susan", "sue", "susie", "suzanne"],
    &["deborah", "deb", "debbie"],
    &["barbara", "barb", "babs"],
    &["donald", "don", "donny"],
    &["kenneth", "ken", "kenny"],
    &["ronald", "ron", "ronnie"],
    &["timothy", "tim", "timmy"],
    &["gregory", "greg"],
    &["jeffrey", "jeff"],
    &["lawrence", "larry"],
    &["gerald", "jerry"],
    &["raymond", "ray"],
    &["frederick", "fred", "freddie"],
    &["henry", "hank", "harry", "hal"],
    &["abigail", "abby", "gail"],
    &["rebecca", "becky", "becca"],
    &["victoria", "vicky", "tori"],
    &["stephanie", "steph"],
    &["francis", "frank", "frankie"],
    &["leonard", "leo", "lenny"],
    &["zachary", "zach", "zack"],
    &["joshua", "josh"],
];

fn group_index() -> &'static HashMap<&'static str, usize> {
    static INDEX: OnceLock<HashMap<&'static str, usize>> = OnceLock::new();
    INDEX.get_or_init(|| {
        let mut map = HashMap::new();
        for (group, names) in NICKNAME_GROUPS.iter().enumerate() {
            for name in *names {
                map.insert(*name, group);
            }
        }
        map
    })
}

/// Normalize a full name: trim, lowercase, collapse inner whitespace
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// True when two given names are the same or belong to one nickname group
#[must_use]
pub fn given_names_equivalent(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    let index = group_index();
    matches!(
        (index.get(a.as_str()), index.get(b.as_str())),
        (Some(left), Some(right)) if left == right
    )
}

/// True when two full names match exactly (case-insensitive, trimmed) or
/// differ only by nickname-equivalent given names.
///
/// "Bob Smith" matches "Robert Smith"; "Roberta Smith" matches neither.
#[must_use]
pub fn names_equivalent(a: &str, b: &str) -> bool {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }

    let (first_a, rest_a) = split_given(&a);
    let (first_b, rest_b) = split_given(&b);
    rest_a == rest_b && given_names_equivalent(first_a, first_b)
}

/// Split a normalized name into its given name and the remainder
fn split_given(name: &str) -> (&str, &str) {
    match name.split_once(' ') {
        Some((first, rest)) => (first, rest),
        None => (name, ""),
    }
}
