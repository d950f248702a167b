//! Shape-based type inference (resolver pass 5): when a receiver has no
//! declared type to trace (pass 3's job), compare the set of members
//! accessed on it against every known class's member set and pick the
//! best-matching class, the way duck-typed languages the parser can't
//! fully type-check still let a reader guess the receiver's type from
//! usage.
//!
//! Grounded on `examples/original_source/.../resolve/shape_resolver.py`'s
//! scoring function: match ratio over observed members, plus a flat bonus
//! per matched method (methods are a stronger signal than fields, since a
//! field name alone is cheap to coincide with an unrelated class).

#[derive(Debug, Clone)]
pub struct ShapeCandidate {
    pub type_name: String,
    pub def_uid: String,
    pub score: f64,
}

/// One candidate class: its name, its def_uid, and its known members as
/// `(name, is_method)` pairs.
pub struct ClassShape<'a> {
    pub type_name: &'a str,
    pub def_uid: &'a str,
    pub members: &'a [(String, bool)],
}

fn score_one(observed: &[String], members: &[(String, bool)], method_bonus: f64) -> f64 {
    if observed.is_empty() {
        return 0.0;
    }
    let matched = observed.iter().filter(|o| members.iter().any(|(n, _)| n == *o)).count();
    let base = matched as f64 / observed.len() as f64;
    let method_matches = observed
        .iter()
        .filter(|o| members.iter().any(|(n, is_method)| n == *o && *is_method))
        .count();
    (base + method_bonus * method_matches as f64).min(1.0)
}

/// Score every candidate class's shape against `observed` member names,
/// keeping only those at or above `threshold`, sorted best-first.
pub fn rank_candidates(observed: &[String], candidates: &[ClassShape<'_>], threshold: f64, method_bonus: f64) -> Vec<ShapeCandidate> {
    let mut scored: Vec<ShapeCandidate> = candidates
        .iter()
        .map(|c| ShapeCandidate {
            type_name: c.type_name.to_string(),
            def_uid: c.def_uid.to_string(),
            score: score_one(observed, c.members, method_bonus),
        })
        .filter(|c| c.score >= threshold)
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_match_scores_one() {
        let members = vec![("foo".to_string(), false), ("bar".to_string(), true)];
        let observed = vec!["foo".to_string(), "bar".to_string()];
        let candidates = vec![ClassShape {
            type_name: "Widget",
            def_uid: "abc",
            members: &members,
        }];
        let ranked = rank_candidates(&observed, &candidates, 0.7, 0.1);
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].score >= 1.0 - 1e-9);
    }

    #[test]
    fn test_below_threshold_excluded() {
        let members = vec![("unrelated".to_string(), false)];
        let observed = vec!["foo".to_string(), "bar".to_string()];
        let candidates = vec![ClassShape {
            type_name: "Other",
            def_uid: "xyz",
            members: &members,
        }];
        let ranked = rank_candidates(&observed, &candidates, 0.7, 0.1);
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_method_bonus_breaks_tie() {
        let members_a = vec![("foo".to_string(), false)];
        let members_b = vec![("foo".to_string(), true)];
        let observed = vec!["foo".to_string()];
        let candidates = vec![
            ClassShape { type_name: "A", def_uid: "a", members: &members_a },
            ClassShape { type_name: "B", def_uid: "b", members: &members_b },
        ];
        let ranked = rank_candidates(&observed, &candidates, 0.5, 0.1);
        assert_eq!(ranked[0].type_name, "B");
    }
}
