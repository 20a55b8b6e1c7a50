/// Lowercases and removes every whitespace character, including internal ones.
pub fn normalize_free_text(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn is_correct_free_text(candidate: &str, canonical: &str, synonyms: &[String]) -> bool {
    let normalized = normalize_free_text(candidate);
    if normalized.is_empty() {
        return false;
    }
    if normalized == normalize_free_text(canonical) {
        return true;
    }
    synonyms
        .iter()
        .any(|synonym| normalized == normalize_free_text(synonym))
}

pub fn is_correct_choice(selected_key: &str, correct_key: &str) -> bool {
    selected_key == correct_key
}

/// Submissions are only accepted once the draft has visible content.
pub fn is_submittable(draft: &str) -> bool {
    !draft.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn normalization_ignores_case_and_all_whitespace() {
        assert_eq!(normalize_free_text(" A b "), normalize_free_text("ab"));
        assert_eq!(normalize_free_text("Cloud\tIn\nOne"), "cloudinone");
        assert_eq!(normalize_free_text("MSP 서비스 개발 그룹"), "msp서비스개발그룹");
    }

    #[test]
    fn canonical_answer_matches_with_spacing_and_case_variants() {
        assert!(is_correct_free_text(
            "msp서비스개발그룹",
            "MSP 서비스 개발 그룹",
            &[]
        ));
        assert!(is_correct_free_text("  MSP 서비스  개발그룹 ", "MSP 서비스 개발 그룹", &[]));
        assert!(!is_correct_free_text("MSP", "MSP 서비스 개발 그룹", &[]));
    }

    #[test]
    fn synonyms_are_accepted_and_normalize_to_canonical() {
        let synonyms = owned(&["cloudinone", "cloud in one", "cloudInOne"]);
        for synonym in &synonyms {
            assert_eq!(
                normalize_free_text(synonym),
                normalize_free_text("cloud in one")
            );
            assert!(is_correct_free_text(synonym, "cloud in one", &synonyms));
        }
        assert!(is_correct_free_text("CLOUD IN ONE", "cloud in one", &synonyms));
        assert!(!is_correct_free_text("cloud", "cloud in one", &synonyms));
    }

    #[test]
    fn synonym_list_can_extend_accepted_answers() {
        let synonyms = owned(&["Managed Service Provider"]);
        assert!(is_correct_free_text(
            "managedserviceprovider",
            "MSP",
            &synonyms
        ));
    }

    #[test]
    fn empty_candidate_never_matches() {
        assert!(!is_correct_free_text("   ", "", &[]));
        assert!(!is_submittable(" \t "));
        assert!(is_submittable(" a "));
    }

    #[test]
    fn choice_requires_exact_key() {
        assert!(is_correct_choice("pink", "pink"));
        assert!(!is_correct_choice("Pink", "pink"));
        assert!(is_correct_choice("6", "6"));
        assert!(!is_correct_choice("16", "6"));
    }
}
