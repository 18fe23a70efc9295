use std::sync::Arc;
use std::time::Duration;

use tilawa_core::corpus::AyaRecord;
use tilawa_core::{
    AlignmentConfig, FragmentOutcome, FragmentReport, QuranText, RecitationEngine,
    RecitationEvent, SequenceErrorType, Severity, TrackingMode,
};
use tokio::sync::broadcast;

const LETTERS: [char; 28] = [
    'ا', 'ب', 'ت', 'ث', 'ج', 'ح', 'خ', 'د', 'ذ', 'ر', 'ز', 'س', 'ش', 'ص', 'ض', 'ط', 'ظ', 'ع',
    'غ', 'ف', 'ق', 'ك', 'ل', 'م', 'ن', 'ه', 'و', 'ي',
];

fn word(i: usize) -> String {
    [
        LETTERS[i % 28],
        LETTERS[(i / 28 + 5) % 28],
        LETTERS[(3 * i + 1) % 28],
        LETTERS[(5 * i + 2) % 28],
    ]
    .iter()
    .collect()
}

const AYA_WORDS: usize = 6;
const PAGE_WORDS: usize = 30;

/// One page of five six-word ayat, then a second page of the same shape.
fn corpus() -> Arc<QuranText> {
    let records = (0..10)
        .map(|aya| {
            let text = (0..AYA_WORDS)
                .map(|k| word(aya * AYA_WORDS + k))
                .collect::<Vec<_>>()
                .join(" ");
            AyaRecord {
                id: aya as u32 + 1,
                jozz: 1,
                page: if aya < 5 { 1 } else { 2 },
                sura_no: 2,
                sura_name_ar: "البقرة".into(),
                aya_no: aya as u16 + 1,
                aya_text_emlaey: text,
                aya_text: None,
            }
        })
        .collect();
    Arc::new(QuranText::from_records(records).expect("corpus loads"))
}

fn recite(from: usize, to: usize) -> String {
    (from..to).map(word).collect::<Vec<_>>().join(" ")
}

fn engine() -> RecitationEngine {
    RecitationEngine::new(AlignmentConfig::default(), corpus()).expect("engine")
}

/// Split the page into fragments of `size` words; a tail shorter than the
/// smallest segment is folded into the last fragment.
fn fragments(size: usize) -> Vec<(usize, usize)> {
    let min = AlignmentConfig::default().min_segment_words;
    let mut spans: Vec<(usize, usize)> = (0..PAGE_WORDS)
        .step_by(size)
        .map(|start| (start, (start + size).min(PAGE_WORDS)))
        .collect();
    if spans.len() > 1 {
        if let Some(&(start, end)) = spans.last() {
            if end - start < min {
                spans.pop();
                if let Some(last) = spans.last_mut() {
                    last.1 = end;
                }
            }
        }
    }
    spans
}

fn recite_page_in_order(size: usize) {
    let engine = engine();
    let id = engine.open_session(1).expect("session");

    let mut covered = Vec::new();
    for (start, end) in fragments(size) {
        let report = engine
            .process_fragment(id, &recite(start, end))
            .expect("fragment");
        assert_eq!(report.outcome, FragmentOutcome::Aligned, "fragment {start}..{end}");
        assert!(
            report.sequence_error.is_none(),
            "unexpected anomaly at {start}: {:?}",
            report.sequence_error
        );
        assert_eq!(report.mode, TrackingMode::Tracking);
        covered.extend(report.correct_indices());
    }

    assert!(covered.windows(2).all(|w| w[0] < w[1]), "not increasing: {covered:?}");
    assert_eq!(covered, (0..PAGE_WORDS).collect::<Vec<_>>());
    let state = engine.session_snapshot(id).expect("snapshot");
    assert_eq!(state.anchor_global_index, PAGE_WORDS);
    assert_eq!(engine.diagnostics().alerts_emitted, 0);
}

#[test]
fn reciting_a_page_aya_by_aya_covers_every_word() {
    recite_page_in_order(AYA_WORDS);
}

#[test]
fn five_word_fragments_cover_every_word() {
    assert_eq!(fragments(5).len(), 6);
    recite_page_in_order(5);
}

#[test]
fn seven_word_fragments_cover_every_word() {
    // 0..7, 7..14, 14..21, 21..30
    assert_eq!(fragments(7).last(), Some(&(21, 30)));
    recite_page_in_order(7);
}

#[test]
fn skipping_two_ayat_is_reported() {
    let engine = engine();
    let id = engine.open_session(1).expect("session");
    engine.process_fragment(id, &recite(0, 6)).expect("aya 1");

    let report = engine.process_fragment(id, &recite(18, 24)).expect("aya 4");
    let error = report.sequence_error.expect("skip reported");
    assert_eq!(error.error_type, SequenceErrorType::SkipAya);
    assert_eq!(error.severity, Severity::Medium);
    let range = error.affected_aya_range.expect("range");
    assert_eq!(range.start.aya_no, 2);
    assert_eq!(range.end.aya_no, 4);
    assert_eq!(report.anchor, 24);
}

#[test]
fn going_back_is_found_in_search_mode_and_moves_the_anchor() {
    let engine = engine();
    let id = engine.open_session(1).expect("session");
    for start in (0..PAGE_WORDS).step_by(AYA_WORDS) {
        engine
            .process_fragment(id, &recite(start, start + AYA_WORDS))
            .expect("fragment");
    }

    // aya 1 lies outside the tracking window behind the anchor
    let mut reports: Vec<FragmentReport> = Vec::new();
    for _ in 0..4 {
        reports.push(engine.process_fragment(id, &recite(0, 6)).expect("repeat"));
    }
    for report in &reports[..3] {
        assert_eq!(report.outcome, FragmentOutcome::NoConfidentSegment);
        assert!(report.sequence_error.is_none());
        assert_eq!(report.anchor, PAGE_WORDS);
    }
    assert_eq!(reports[1].mode, TrackingMode::Tracking);
    assert_eq!(reports[2].mode, TrackingMode::Search);

    let found = &reports[3];
    assert_eq!(found.outcome, FragmentOutcome::Aligned);
    assert_eq!(
        found.sequence_error.as_ref().map(|e| e.error_type),
        Some(SequenceErrorType::BackwardsAnomaly)
    );
    assert_eq!(found.mode, TrackingMode::Tracking);
    assert_eq!(found.anchor, 6);
}

#[test]
fn other_pages_text_is_a_page_mismatch() {
    let engine = engine();
    let id = engine.open_session(1).expect("session");
    let report = engine
        .process_fragment(id, &recite(36, 42))
        .expect("fragment");
    let error = report.sequence_error.expect("mismatch");
    assert_eq!(error.error_type, SequenceErrorType::PageMismatch);
    assert_eq!(error.severity, Severity::High);
    assert!(report.matches.is_empty());
}

async fn recv_report(rx: &mut broadcast::Receiver<RecitationEvent>) -> RecitationEvent {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Ok(event)) => return event,
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => {
                panic!("event channel closed unexpectedly")
            }
            Err(_) => panic!("timed out waiting for recitation event"),
        }
    }
}

#[tokio::test]
async fn queued_fragments_commit_in_order() {
    let engine = Arc::new(engine());
    let id = engine.open_session(1).expect("session");
    let mut rx = engine.subscribe();
    let queue = engine.spawn_queue(id).expect("queue");

    let mut pushed = Vec::new();
    for start in (0..PAGE_WORDS).step_by(AYA_WORDS) {
        pushed.push(queue.push(recite(start, start + AYA_WORDS)).expect("push"));
    }
    assert_eq!(pushed, vec![1, 2, 3, 4, 5]);

    let mut anchors = Vec::new();
    for expected_seq in 1..=5u64 {
        match recv_report(&mut rx).await {
            RecitationEvent::Report(report) => {
                assert_eq!(report.seq, expected_seq);
                assert!(report.sequence_error.is_none());
                anchors.push(report.anchor);
            }
            RecitationEvent::Dropped { reason, .. } => panic!("fragment dropped: {reason}"),
        }
    }
    assert_eq!(anchors, vec![6, 12, 18, 24, 30]);
    assert_eq!(engine.diagnostics().dropped, 0);

    engine.close_session(id).expect("close");
    assert!(queue.push(recite(0, 6)).is_err());
}

/// A single 600-word page, large enough that evaluation takes a while.
fn long_page_corpus() -> Arc<QuranText> {
    let records = (0..100)
        .map(|aya| AyaRecord {
            id: aya as u32 + 1,
            jozz: 1,
            page: 1,
            sura_no: 2,
            sura_name_ar: "البقرة".into(),
            aya_no: aya as u16 + 1,
            aya_text_emlaey: recite(aya * AYA_WORDS, (aya + 1) * AYA_WORDS),
            aya_text: None,
        })
        .collect();
    Arc::new(QuranText::from_records(records).expect("corpus loads"))
}

#[tokio::test]
async fn fragment_past_its_deadline_leaves_state_untouched() {
    let config = AlignmentConfig {
        fragment_deadline_ms: 1,
        ..AlignmentConfig::default()
    };
    let engine = Arc::new(RecitationEngine::new(config, long_page_corpus()).expect("engine"));
    let id = engine.open_session(1).expect("session");
    let before = engine.session_snapshot(id).expect("snapshot");
    let mut rx = engine.subscribe();
    let queue = engine.spawn_queue(id).expect("queue");

    queue.push(recite(0, 25)).expect("push");

    // Whether 1 ms is enough depends on the machine; both endings must hold.
    match recv_report(&mut rx).await {
        RecitationEvent::Dropped { seq, reason, .. } => {
            assert_eq!(seq, 1);
            assert_eq!(reason, "deadline exceeded");
            assert_eq!(engine.session_snapshot(id).expect("snapshot"), before);
            assert_eq!(engine.diagnostics().dropped, 1);
        }
        RecitationEvent::Report(report) => {
            assert_eq!(report.seq, 1);
            let after = engine.session_snapshot(id).expect("snapshot");
            assert_eq!(after.anchor_global_index, report.anchor);
            assert_eq!(after.revision, before.revision + 1);
        }
    }
}

#[tokio::test]
async fn sessions_are_independent() {
    let engine = Arc::new(engine());
    let a = engine.open_session(1).expect("session a");
    let b = engine.open_session(2).expect("session b");

    let worker_a = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || {
            engine
                .process_fragment(a, &recite(0, 6))
                .expect("fragment a")
        })
    };
    let worker_b = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || {
            engine
                .process_fragment(b, &recite(30, 36))
                .expect("fragment b")
        })
    };

    let report_a = worker_a.await.expect("join a");
    let report_b = worker_b.await.expect("join b");
    assert_eq!(report_a.anchor, 6);
    assert_eq!(report_b.anchor, 36);
    assert_eq!(report_b.correct_indices().next(), Some(30));
}
