use parley::thought::{answer_text, format_thinking, ThinkingTracker, CLOSE_TAG, OPEN_TAG};

const BALANCED: &[(&str, &str)] = &[
    ("<think>hello</think>world", "*hello*world"),
    ("before<think>x</think>after", "before*x*after"),
    ("<think> padded </think>", "*padded*"),
    ("<think>a</think><think>b</think>", "*a**b*"),
    ("<think></think>", ""),
    ("plain answer", "plain answer"),
];

#[test]
fn balanced_inputs_lose_their_tags() {
    for (input, expected) in BALANCED {
        let out = format_thinking(input);
        assert_eq!(&out, expected, "input: {input:?}");
        assert!(!out.contains(OPEN_TAG) && !out.contains(CLOSE_TAG));
    }
}

#[test]
fn unterminated_thought_is_kept() {
    assert_eq!(format_thinking("<think>unterminated"), "*unterminated*");
}

/// Feeding a reply in arbitrary chunk sizes yields the same toggles as feeding it whole.
#[test]
fn tracker_is_independent_of_chunking() {
    let reply = "<think>weighing options</think>The answer is 4.<think>double-check</think>Yes.";
    let whole = ThinkingTracker::new().feed(reply);

    for size in 1..=9 {
        let mut tracker = ThinkingTracker::new();
        let chars: Vec<char> = reply.chars().collect();
        let toggles: Vec<bool> = chars
            .chunks(size)
            .flat_map(|c| tracker.feed(&c.iter().collect::<String>()))
            .collect();
        assert_eq!(toggles, whole, "chunk size {size}");
        assert!(!tracker.is_thinking());
    }
    assert_eq!(whole, vec![true, false, true, false]);
}

#[test]
fn answer_text_drops_reasoning() {
    assert_eq!(answer_text("<think>hmm</think>Paris"), "Paris");
}
