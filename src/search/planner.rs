//! Query classification and strategy selection.
//!
//! Classification is cheap and pattern-driven: case-insensitive keyword
//! presence maps a query to one of eight classes, ties broken by a fixed
//! priority ordering. The classifier is deterministic on its input; no
//! models are involved.

use serde::Serialize;

/// Classes of queries the system distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryClass {
    /// Find specific information.
    Lookup,
    /// Compare multiple items.
    Compare,
    /// Create new insight across documents.
    Synthesize,
    /// Discover related content.
    Explore,
    /// Chronological information.
    Timeline,
    /// Cause-effect relationships.
    Causal,
    /// Define a concept.
    Definition,
    /// Step-by-step instructions.
    Howto,
}

impl QueryClass {
    /// Stable string form for surfaces and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::Compare => "compare",
            Self::Synthesize => "synthesize",
            Self::Explore => "explore",
            Self::Timeline => "timeline",
            Self::Causal => "causal",
            Self::Definition => "definition",
            Self::Howto => "howto",
        }
    }
}

/// Retrieval strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Embed the query, cosine top-k.
    VectorOnly,
    /// Entity-anchored graph traversal.
    GraphOnly,
    /// Vector and graph fan-out merged and reranked.
    Hybrid,
    /// Date-window restriction, chronological order.
    Temporal,
    /// Heading-level prior within files.
    Hierarchical,
}

impl Strategy {
    /// Stable string form for surfaces and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VectorOnly => "vector_only",
            Self::GraphOnly => "graph_only",
            Self::Hybrid => "hybrid",
            Self::Temporal => "temporal",
            Self::Hierarchical => "hierarchical",
        }
    }
}

/// Keyword table in priority order: on a tie, the earlier class wins.
const PATTERNS: &[(QueryClass, &[&str])] = &[
    (
        QueryClass::Lookup,
        &["what is", "who is", "when did", "where is", "find", "search"],
    ),
    (
        QueryClass::Compare,
        &["compare", "vs", "versus", "difference", "contrast"],
    ),
    (
        QueryClass::Synthesize,
        &["summarize", "synthesis", "overview", "analysis", "insights"],
    ),
    (
        QueryClass::Explore,
        &["explore", "discover", "related", "connected", "associated"],
    ),
    (
        QueryClass::Timeline,
        &["timeline", "chronology", "history", "evolution", "progression"],
    ),
    (
        QueryClass::Causal,
        &["why", "cause", "effect", "because", "leads to", "results in"],
    ),
    (
        QueryClass::Definition,
        &["define", "definition", "meaning", "explain"],
    ),
    (
        QueryClass::Howto,
        &["how to", "steps", "process", "procedure", "guide"],
    ),
];

/// Classifies a query by keyword presence.
///
/// The class with the most keyword hits wins; ties break toward the
/// earlier class in the priority table; no hits default to lookup.
#[must_use]
pub fn classify(query: &str) -> QueryClass {
    let lower = query.to_lowercase();
    let mut best = QueryClass::Lookup;
    let mut best_score = 0usize;

    for (class, keywords) in PATTERNS {
        let score = keywords.iter().filter(|kw| lower.contains(*kw)).count();
        if score > best_score {
            best = *class;
            best_score = score;
        }
    }
    best
}

/// User preference flags. A preference may upgrade a single-mode
/// strategy to hybrid; it never downgrades.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preferences {
    /// Prefer semantic (vector) evidence.
    pub prefer_semantic: bool,
    /// Prefer graph evidence.
    pub prefer_graph: bool,
}

/// Maps a query class to its retrieval strategy, honoring preferences.
#[must_use]
pub fn select_strategy(class: QueryClass, preferences: Preferences) -> Strategy {
    let base = match class {
        QueryClass::Lookup | QueryClass::Synthesize => Strategy::Hybrid,
        QueryClass::Compare | QueryClass::Explore | QueryClass::Causal => Strategy::GraphOnly,
        QueryClass::Timeline => Strategy::Temporal,
        QueryClass::Definition => Strategy::VectorOnly,
        QueryClass::Howto => Strategy::Hierarchical,
    };

    match base {
        Strategy::GraphOnly if preferences.prefer_semantic => Strategy::Hybrid,
        Strategy::VectorOnly if preferences.prefer_graph => Strategy::Hybrid,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("what is a semantic link", QueryClass::Lookup)]
    #[test_case("compare BM25 versus cosine", QueryClass::Compare)]
    #[test_case("summarize my notes with an overview", QueryClass::Synthesize)]
    #[test_case("discover related concepts", QueryClass::Explore)]
    #[test_case("timeline of the project history", QueryClass::Timeline)]
    #[test_case("why does this cause that", QueryClass::Causal)]
    #[test_case("define entropy", QueryClass::Definition)]
    #[test_case("how to configure the index", QueryClass::Howto)]
    fn test_classify(query: &str, expected: QueryClass) {
        assert_eq!(classify(query), expected);
    }

    #[test]
    fn test_classify_defaults_to_lookup() {
        assert_eq!(classify("zebra telescope"), QueryClass::Lookup);
    }

    #[test]
    fn test_classify_tie_breaks_by_priority_order() {
        // One lookup keyword and one compare keyword: lookup is listed
        // first and wins the tie.
        assert_eq!(classify("find the difference"), QueryClass::Lookup);
    }

    #[test]
    fn test_classify_deterministic() {
        let query = "explain how to explore the history";
        assert_eq!(classify(query), classify(query));
    }

    #[test]
    fn test_strategy_mapping() {
        let none = Preferences::default();
        assert_eq!(select_strategy(QueryClass::Lookup, none), Strategy::Hybrid);
        assert_eq!(select_strategy(QueryClass::Synthesize, none), Strategy::Hybrid);
        assert_eq!(select_strategy(QueryClass::Compare, none), Strategy::GraphOnly);
        assert_eq!(select_strategy(QueryClass::Explore, none), Strategy::GraphOnly);
        assert_eq!(select_strategy(QueryClass::Causal, none), Strategy::GraphOnly);
        assert_eq!(select_strategy(QueryClass::Timeline, none), Strategy::Temporal);
        assert_eq!(select_strategy(QueryClass::Definition, none), Strategy::VectorOnly);
        assert_eq!(select_strategy(QueryClass::Howto, none), Strategy::Hierarchical);
    }

    #[test]
    fn test_preferences_upgrade_never_downgrade() {
        let semantic = Preferences {
            prefer_semantic: true,
            prefer_graph: false,
        };
        let graph = Preferences {
            prefer_semantic: false,
            prefer_graph: true,
        };

        // Upgrades to hybrid.
        assert_eq!(select_strategy(QueryClass::Compare, semantic), Strategy::Hybrid);
        assert_eq!(select_strategy(QueryClass::Definition, graph), Strategy::Hybrid);

        // Never downgrades an already-hybrid or orthogonal strategy.
        assert_eq!(select_strategy(QueryClass::Lookup, semantic), Strategy::Hybrid);
        assert_eq!(select_strategy(QueryClass::Timeline, graph), Strategy::Temporal);
        assert_eq!(select_strategy(QueryClass::Definition, semantic), Strategy::VectorOnly);
    }
}
