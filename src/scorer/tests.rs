use super::*;

fn scorer() -> QualityScorer {
    QualityScorer::new().expect("scorer patterns should compile")
}

const ESSAY: &str = "Overview\nTemperature controls randomness in sampling.\n\nLower values make answers focused. However, they can also become repetitive and dull over long outputs.\n\n1. Use low values for facts\n2. Use higher values for brainstorming\n\nIn conclusion, tune both parameters together.";

#[test]
fn length_score_follows_piecewise_ramp() {
    let scorer = scorer();
    let cases = [
        (0usize, 0.0),
        (25, 0.5),
        (50, 1.0),
        (2000, 1.0),
        (2500, 0.9),
        (7000, 0.0),
    ];

    for (length, expected) in cases {
        let text = "a".repeat(length);
        assert_eq!(scorer.length_score(&text).value, expected, "length {length}");
    }

    let metadata = scorer.length_score("").metadata;
    assert_eq!(metadata.get("length"), Some(&json!(0)));
    assert_eq!(metadata.get("optimal_range"), Some(&json!("50-2000")));
}

#[test]
fn coherence_is_half_for_fewer_than_two_sentences() {
    let scorer = scorer();
    assert_eq!(scorer.coherence_score("No terminator here").value, 0.5);
    assert_eq!(scorer.coherence_score("Only one sentence.").value, 0.5);
    assert_eq!(scorer.coherence_score("...!!!").value, 0.5);
}

#[test]
fn coherence_blends_transitions_and_length_variation() {
    let result = scorer().coherence_score(
        "Short one. This second sentence is a good deal longer than the first. Then done.",
    );
    assert_eq!(result.value, 0.241);
    assert_eq!(result.metadata.get("sentence_count"), Some(&json!(3)));
    assert_eq!(result.metadata.get("transition_count"), Some(&json!(1)));
}

#[test]
fn completeness_branches() {
    let scorer = scorer();

    let concluded = scorer.completeness_score("In conclusion, the answer is yes.");
    assert_eq!(concluded.value, 0.813);
    assert_eq!(concluded.metadata.get("has_conclusion"), Some(&json!(true)));

    let questioning = scorer.completeness_score("What? How? Why? When?");
    assert_eq!(questioning.value, 0.025);
    assert_eq!(questioning.metadata.get("question_count"), Some(&json!(5)));

    let plain = scorer.completeness_score(&"Plain statement. ".repeat(30));
    assert_eq!(plain.value, 0.7);
}

#[test]
fn structure_rewards_paragraphs_lists_and_headers() {
    let scorer = scorer();

    let structured = scorer.structure_score(
        "Title\nBody line one continues.\n\nSecond paragraph here.\n\n- item one\n- item two",
    );
    assert_eq!(structured.value, 1.0);
    assert_eq!(structured.metadata.get("paragraph_count"), Some(&json!(3)));
    assert_eq!(structured.metadata.get("list_items"), Some(&json!(2)));
    assert_eq!(structured.metadata.get("header_count"), Some(&json!(2)));

    let flat = scorer.structure_score("Just one line of text.");
    assert_eq!(flat.value, 0.2);
}

#[test]
fn structure_counts_numbered_items() {
    let result = scorer().structure_score("Steps\n1. first\n2) second\n3. third");
    assert_eq!(result.metadata.get("list_items"), Some(&json!(3)));
}

#[test]
fn readability_prefers_moderate_sentences_and_words() {
    let result = scorer().readability_score("The cat sat on the mat.");
    assert_eq!(result.value, 0.62);
    assert_eq!(result.metadata.get("avg_sentence_length"), Some(&json!(6.0)));
    assert_eq!(result.metadata.get("avg_word_length"), Some(&json!(3.0)));
    assert_eq!(result.metadata.get("word_count"), Some(&json!(6)));
}

#[test]
fn overall_is_weighted_blend_of_components() {
    let scorer = scorer();
    let metrics = scorer.score_all(ESSAY);
    assert_eq!(metrics.len(), 6);

    let mut expected = 0.0;
    for (name, weight) in OVERALL_WEIGHTS {
        expected += metrics[&name].value * weight;
    }

    let overall = &metrics[&MetricName::OverallScore];
    assert!((overall.value - round3(expected)).abs() < 1e-9);

    let components = overall
        .metadata
        .get("component_scores")
        .and_then(Value::as_object)
        .expect("overall metadata should embed component scores");
    assert_eq!(components.len(), 5);
    assert_eq!(
        components.get("readability_score"),
        Some(&json!(metrics[&MetricName::ReadabilityScore].value))
    );
}

#[test]
fn empty_text_short_circuits_everything_but_length() {
    let scorer = scorer();
    for text in ["", "   \n\t "] {
        let metrics = scorer.score_all(text);
        for (name, metric) in &metrics {
            if *name == MetricName::LengthScore {
                continue;
            }
            assert_eq!(metric.value, 0.0, "{} should be zero", name.as_str());
            assert!(metric.metadata.is_empty(), "{} should have no metadata", name.as_str());
        }

        let expected_length = round3(char_len(text) as f64 / 50.0);
        assert_eq!(metrics[&MetricName::LengthScore].value, expected_length);
    }

    let whitespace = scorer.length_score("   \n\t ");
    assert_eq!(whitespace.value, 0.12);
    assert_eq!(whitespace.metadata.get("length"), Some(&json!(6)));
}

#[test]
fn scores_stay_in_unit_interval() {
    let scorer = scorer();
    let samples = [
        ESSAY.to_string(),
        "x".repeat(9000),
        "why? ".repeat(400),
        "- a\n- b\n- c\n\n\n\n1) d\n\nTitle\nbody\n\n".repeat(12),
        "Word. ".repeat(3),
    ];

    for sample in &samples {
        for (name, metric) in scorer.score_all(sample) {
            assert!(
                (0.0..=1.0).contains(&metric.value),
                "{} out of range: {}",
                name.as_str(),
                metric.value
            );
        }
    }
}
