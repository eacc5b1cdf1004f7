//! Splits one utterance into ordered sub-tasks.
//!
//! Comparative phrasing ("difference between A and B", "A or B is better",
//! "A versus B") becomes lookup/lookup/compare. Hypothetical phrasing ("if C
//! then A", "what if C", "in case C") becomes check/simulate/analyze.
//! Anything else is split on logical connectors.

use std::sync::LazyLock;

use regex::Regex;

use storedesk_core::domain::task::{SubTask, SubTaskKind, SubTaskPayload};

static DIFFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bdifference\s+between\s+(.+?)\s+and\s+(.+)").expect("valid regex")
});
static EITHER_OR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.+?)\s+or\s+(.+)$").expect("valid regex"));
static VERSUS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)\s+(?:versus|vs\.?)\s+(.+)$").expect("valid regex")
});
// Bare "more", "less" and "best" only count inside a comparative question
// ("which ... more", "sells best"), never in a plain list.
static COMPARISON_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:better|worse|cheaper|pricier|prefer|preferable|choose|pick|faster)\b|\bwhich\b.*\b(?:more|less|best)\b|\b(?:sells?|selling)\s+(?:more|less|best)\b",
    )
    .expect("valid regex")
});
static LEADING_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:which\s+(?:one\s+)?(?:is|would\s+be|sells)\s+(?:the\s+)?(?:better|best|cheaper|(?:more|less)(?:\s+\w+)?)\s*[,:]?\s*|should\s+(?:i|we)\s+(?:choose|pick|prefer|stock|order|buy|promote)\s+|do\s+you\s+prefer\s+|compare\s+|is\s+)",
    )
    .expect("valid regex")
});
static TRAILING_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s+(?:(?:is|are|would\s+be|seems?|sells?)\s+)?(?:the\s+)?(?:better|worse|cheaper|pricier|best|preferable|faster)\b.*$",
    )
    .expect("valid regex")
});
static IF_THEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bif\s+(.+?)\s*,?\s+then\s+(.+)").expect("valid regex")
});
static WHAT_IF_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bwhat\s+if\s+(.+)").expect("valid regex"));
static IN_CASE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bin\s+case\s+(.+)").expect("valid regex"));
static CONNECTOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:and|or|also|then|plus|as\s+well\s+as|after\s+that)\b")
        .expect("valid regex")
});

pub fn decompose(utterance: &str) -> Vec<SubTask> {
    if let Some([first, second]) = comparison_objects(utterance) {
        return vec![
            SubTask::new(SubTaskKind::InfoLookup, 0, SubTaskPayload::Object { object: first.clone() }),
            SubTask::new(SubTaskKind::InfoLookup, 1, SubTaskPayload::Object { object: second.clone() }),
            SubTask::new(SubTaskKind::Compare, 2, SubTaskPayload::Objects { objects: [first, second] }),
        ];
    }

    if let Some((condition, action)) = hypothetical_parts(utterance) {
        return vec![
            SubTask::new(
                SubTaskKind::CheckCondition,
                0,
                SubTaskPayload::Condition { condition: condition.clone() },
            ),
            SubTask::new(
                SubTaskKind::SimulateResult,
                1,
                SubTaskPayload::Action { action: action.clone() },
            ),
            SubTask::new(SubTaskKind::AnalyzeResult, 2, SubTaskPayload::Scenario { condition, action }),
        ];
    }

    let segments: Vec<String> =
        CONNECTOR_PATTERN.split(utterance).map(clean_segment).filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return vec![SubTask::new(
            SubTaskKind::Query,
            0,
            SubTaskPayload::Text { text: utterance.trim().to_string() },
        )];
    }

    segments
        .into_iter()
        .enumerate()
        .map(|(order, text)| SubTask::new(SubTaskKind::Query, order, SubTaskPayload::Text { text }))
        .collect()
}

/// Two compared objects, trying each comparison marker in priority order.
pub fn comparison_objects(utterance: &str) -> Option<[String; 2]> {
    let text = utterance.trim();

    if let Some(captures) = DIFFERENCE_PATTERN.captures(text) {
        if let Some(objects) = clean_pair(&captures[1], &captures[2]) {
            return Some(objects);
        }
    }

    if COMPARISON_CUE.is_match(text) {
        if let Some(captures) = EITHER_OR_PATTERN.captures(text) {
            if let Some(objects) = clean_pair(&captures[1], &captures[2]) {
                return Some(objects);
            }
        }
    }

    let captures = VERSUS_PATTERN.captures(text)?;
    clean_pair(&captures[1], &captures[2])
}

/// Condition and action of a hypothetical request.
pub fn hypothetical_parts(utterance: &str) -> Option<(String, String)> {
    if let Some(captures) = IF_THEN_PATTERN.captures(utterance) {
        let condition = clean_segment(&captures[1]);
        let action = clean_segment(&captures[2]);
        if !condition.is_empty() && !action.is_empty() {
            return Some((condition, action));
        }
    }

    let captures =
        WHAT_IF_PATTERN.captures(utterance).or_else(|| IN_CASE_PATTERN.captures(utterance))?;
    let condition = clean_segment(&captures[1]);
    if condition.is_empty() {
        return None;
    }
    let action = format!("the result of {condition}");
    Some((condition, action))
}

fn clean_pair(first: &str, second: &str) -> Option<[String; 2]> {
    let first = clean_segment(&LEADING_FRAME.replace(first.trim(), ""));
    let second = clean_segment(&TRAILING_CUE.replace(second.trim(), ""));
    if first.is_empty() || second.is_empty() || first.eq_ignore_ascii_case(&second) {
        return None;
    }
    Some([first, second])
}

fn clean_segment(segment: &str) -> String {
    segment
        .trim()
        .trim_matches(|c: char| matches!(c, '?' | '.' | ',' | '!' | ';' | ':' | '"') || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use storedesk_core::domain::task::{SubTaskKind, SubTaskPayload};

    use super::decompose;

    fn orders(tasks: &[storedesk_core::domain::task::SubTask]) -> Vec<usize> {
        tasks.iter().map(|task| task.order).collect()
    }

    #[test]
    fn either_or_with_cue_becomes_comparison() {
        let tasks = decompose("X or Y is better");
        assert_eq!(tasks.len(), 3);
        assert_eq!(orders(&tasks), vec![0, 1, 2]);
        assert_eq!(tasks[0].task_type, SubTaskKind::InfoLookup);
        assert_eq!(tasks[1].task_type, SubTaskKind::InfoLookup);
        assert_eq!(
            tasks[2].payload,
            SubTaskPayload::Objects { objects: ["X".to_string(), "Y".to_string()] }
        );
    }

    #[test]
    fn difference_between_takes_priority() {
        let tasks = decompose("What's the difference between the red mug and the blue mug?");
        assert_eq!(
            tasks[2].payload,
            SubTaskPayload::Objects { objects: ["the red mug".to_string(), "the blue mug".to_string()] }
        );
        assert_eq!(tasks[0].payload, SubTaskPayload::Object { object: "the red mug".to_string() });
    }

    #[test]
    fn question_framing_is_stripped_from_objects() {
        let tasks = decompose("Which is better, Premium Plan or Basic Plan?");
        assert_eq!(
            tasks[2].payload,
            SubTaskPayload::Objects { objects: ["Premium Plan".to_string(), "Basic Plan".to_string()] }
        );

        let versus = decompose("compare Widget vs Gadget");
        assert_eq!(
            versus[2].payload,
            SubTaskPayload::Objects { objects: ["Widget".to_string(), "Gadget".to_string()] }
        );
    }

    #[test]
    fn plain_or_without_cue_is_split() {
        let tasks = decompose("show pending orders or refunds");
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|task| task.task_type == SubTaskKind::Query));
    }

    #[test]
    fn more_and_best_in_plain_lists_do_not_compare() {
        let more = decompose("show more orders or refunds");
        assert_eq!(more.len(), 2);
        assert!(more.iter().all(|task| task.task_type == SubTaskKind::Query));
        assert_eq!(more[0].text(), "show more orders");

        let best = decompose("show best sellers or new arrivals");
        assert_eq!(best.len(), 2);
        assert!(best.iter().all(|task| task.task_type == SubTaskKind::Query));
    }

    #[test]
    fn which_sells_more_still_compares() {
        let tasks = decompose("Which sells more, Blue Mug or Red Mug?");
        assert_eq!(tasks.len(), 3);
        assert_eq!(
            tasks[2].payload,
            SubTaskPayload::Objects { objects: ["Blue Mug".to_string(), "Red Mug".to_string()] }
        );
    }

    #[test]
    fn spelled_out_versus_compares() {
        let tasks = decompose("Widget versus Gadget");
        assert_eq!(orders(&tasks), vec![0, 1, 2]);
        assert_eq!(tasks[2].task_type, SubTaskKind::Compare);
        assert_eq!(
            tasks[2].payload,
            SubTaskPayload::Objects { objects: ["Widget".to_string(), "Gadget".to_string()] }
        );
    }

    #[test]
    fn in_case_synthesizes_action() {
        let tasks = decompose("in case stock runs out");
        assert_eq!(orders(&tasks), vec![0, 1, 2]);
        assert_eq!(tasks[0].task_type, SubTaskKind::CheckCondition);
        assert_eq!(
            tasks[0].payload,
            SubTaskPayload::Condition { condition: "stock runs out".to_string() }
        );
        assert_eq!(tasks[1].task_type, SubTaskKind::SimulateResult);
        assert_eq!(
            tasks[1].payload,
            SubTaskPayload::Action { action: "the result of stock runs out".to_string() }
        );
        assert_eq!(tasks[2].task_type, SubTaskKind::AnalyzeResult);
    }

    #[test]
    fn if_then_produces_scenario() {
        let tasks = decompose("if stock drops below 5, then reorder 20 units");
        assert_eq!(tasks.len(), 3);
        assert_eq!(orders(&tasks), vec![0, 1, 2]);
        assert_eq!(
            tasks[0].payload,
            SubTaskPayload::Condition { condition: "stock drops below 5".to_string() }
        );
        assert_eq!(tasks[1].payload, SubTaskPayload::Action { action: "reorder 20 units".to_string() });
        assert_eq!(tasks[2].task_type, SubTaskKind::AnalyzeResult);
    }

    #[test]
    fn what_if_synthesizes_action() {
        let tasks = decompose("What if we raise prices by 10%?");
        assert_eq!(
            tasks[1].payload,
            SubTaskPayload::Action { action: "the result of we raise prices by 10%".to_string() }
        );
        assert_eq!(
            tasks[2].payload,
            SubTaskPayload::Scenario {
                condition: "we raise prices by 10%".to_string(),
                action: "the result of we raise prices by 10%".to_string(),
            }
        );
    }

    #[test]
    fn connectors_split_in_order() {
        let tasks = decompose("show products and check stock");
        assert_eq!(tasks.len(), 2);
        assert_eq!(orders(&tasks), vec![0, 1]);
        assert_eq!(tasks[0].text(), "show products");
        assert_eq!(tasks[1].text(), "check stock");

        let many = decompose("list orders, also show top customers and then export the report");
        assert_eq!(orders(&many), vec![0, 1, 2]);
        assert_eq!(many[2].text(), "export the report");
    }

    #[test]
    fn always_returns_at_least_one_sub_task() {
        let single = decompose("show products");
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].order, 0);

        let only_connectors = decompose("  and  ");
        assert_eq!(only_connectors.len(), 1);
        assert_eq!(only_connectors[0].text(), "and");

        let empty = decompose("");
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].text(), "");
    }
}
