use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// A version string as it appears in a coordinate or POM. Equality is textual; [MavenVersion::compare]
///  implements Maven's ordering where e.g. `1.0 == 1.0.0` and `1.0-rc1 < 1.0`.
#[derive(Debug, Eq, PartialEq, Clone, Hash)]
pub struct MavenVersion(String);

impl MavenVersion {
    pub fn new(version: &str) -> MavenVersion {
        MavenVersion(version.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_snapshot(&self) -> bool {
        self.0.ends_with("-SNAPSHOT")
    }

    pub fn compare(&self, other: &MavenVersion) -> Ordering {
        let left = parse_items(&self.0);
        let right = parse_items(&other.0);

        for i in 0..left.len().max(right.len()) {
            let ordering = match (left.get(i), right.get(i)) {
                (Some(l), Some(r)) => l.cmp(r),
                (Some(l), None) => l.cmp_with_padding(),
                (None, Some(r)) => r.cmp_with_padding().reverse(),
                (None, None) => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl Display for MavenVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Eq, PartialEq, Clone)]
enum Item {
    /// decimal digits without leading zeros; "" is zero
    Number(String),
    Qualifier(String),
}

const RELEASE_RANK: usize = 5;

impl Item {
    fn is_null(&self) -> bool {
        match self {
            Item::Number(n) => n.is_empty(),
            Item::Qualifier(q) => q.is_empty(),
        }
    }

    fn qualifier_rank(q: &str) -> usize {
        match q {
            "alpha" => 0,
            "beta" => 1,
            "milestone" => 2,
            "rc" => 3,
            "snapshot" => 4,
            "" => RELEASE_RANK,
            "sp" => 6,
            _ => 7,
        }
    }

    /// compares against a missing item, e.g. the third item of `1.0` when comparing with `1.0.1`
    fn cmp_with_padding(&self) -> Ordering {
        match self {
            Item::Number(n) if n.is_empty() => Ordering::Equal,
            Item::Number(_) => Ordering::Greater,
            Item::Qualifier(q) => Self::qualifier_rank(q).cmp(&RELEASE_RANK),
        }
    }
}

impl Ord for Item {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Item::Number(l), Item::Number(r)) => l.len().cmp(&r.len()).then_with(|| l.cmp(r)),
            (Item::Number(_), Item::Qualifier(_)) => Ordering::Greater,
            (Item::Qualifier(_), Item::Number(_)) => Ordering::Less,
            (Item::Qualifier(l), Item::Qualifier(r)) => Self::qualifier_rank(l)
                .cmp(&Self::qualifier_rank(r))
                .then_with(|| l.cmp(r)),
        }
    }
}
impl PartialOrd for Item {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn parse_items(version: &str) -> Vec<Item> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut current_is_digit = false;

    let flush = |current: &mut String, is_digit: bool, items: &mut Vec<Item>| {
        if is_digit {
            items.push(Item::Number(current.trim_start_matches('0').to_string()));
        }
        else {
            items.push(Item::Qualifier(normalize_qualifier(current)));
        }
        current.clear();
    };

    for c in version.trim().chars() {
        if c == '.' || c == '-' || c == '_' {
            flush(&mut current, current_is_digit, &mut items);
            current_is_digit = false;
            continue;
        }

        let is_digit = c.is_ascii_digit();
        if !current.is_empty() && is_digit != current_is_digit {
            flush(&mut current, current_is_digit, &mut items);
        }
        current_is_digit = is_digit;
        current.push(c);
    }
    flush(&mut current, current_is_digit, &mut items);

    while items.last().map(Item::is_null).unwrap_or(false) {
        items.pop();
    }
    items
}

fn normalize_qualifier(q: &str) -> String {
    let q = q.to_ascii_lowercase();
    match q.as_str() {
        "a" => "alpha".to_string(),
        "b" => "beta".to_string(),
        "m" => "milestone".to_string(),
        "cr" => "rc".to_string(),
        "ga" | "final" | "release" => "".to_string(),
        _ => q,
    }
}
