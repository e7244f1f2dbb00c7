//! Turning per-frame labels into merged chord segments

use crate::analysis::ChordSegment;
use crate::chroma::ChordFeatures;

/// Lazily merges consecutive segments that share a label
pub struct RunLengthMerge<I: Iterator<Item = ChordSegment>> {
    inner: std::iter::Peekable<I>,
}

impl<I: Iterator<Item = ChordSegment>> Iterator for RunLengthMerge<I> {
    type Item = ChordSegment;

    fn next(&mut self) -> Option<ChordSegment> {
        let mut current = self.inner.next()?;
        while let Some(next) = self.inner.next_if(|n| n.label == current.label) {
            current.end_time = next.end_time;
        }
        Some(current)
    }
}

/// Merge adjacent identical labels into one segment spanning their union
pub fn merge_runs<I>(segments: I) -> RunLengthMerge<I::IntoIter>
where
    I: IntoIterator<Item = ChordSegment>,
{
    RunLengthMerge {
        inner: segments.into_iter().peekable(),
    }
}

/// One segment per frame, timed on the feature hop grid
pub fn frame_segments<'a, S: AsRef<str> + 'a>(
    labels: &'a [S],
    features: &'a ChordFeatures,
) -> impl Iterator<Item = ChordSegment> + 'a {
    labels.iter().enumerate().filter_map(move |(idx, label)| {
        let (start, end) = features.frame_span(idx);
        (end > start).then(|| ChordSegment::new(label.as_ref(), start, end))
    })
}

/// Absorb short interior segments into their longer neighbour.
///
/// Repeatedly takes the shortest interior segment below `min_duration` and
/// extends a neighbour over it, then re-merges equal neighbours. The first and
/// last segments are never absorbed.
pub fn absorb_short_segments(segments: Vec<ChordSegment>, min_duration: f32) -> Vec<ChordSegment> {
    let mut segments: Vec<ChordSegment> = merge_runs(segments).collect();
    if min_duration <= 0.0 {
        return segments;
    }

    loop {
        if segments.len() < 3 {
            return segments;
        }
        let shortest = (1..segments.len() - 1)
            .filter(|&i| segments[i].duration() < min_duration)
            .min_by(|&a, &b| {
                segments[a]
                    .duration()
                    .partial_cmp(&segments[b].duration())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        let Some(idx) = shortest else {
            return segments;
        };

        let removed = segments.remove(idx);
        if segments[idx - 1].duration() >= segments[idx].duration() {
            segments[idx - 1].end_time = removed.end_time;
        } else {
            segments[idx].start_time = removed.start_time;
        }
        segments = merge_runs(segments).collect();
    }
}

/// Labels to segments: frame timing, run-length merge, then chatter removal
pub fn labels_to_segments<S: AsRef<str>>(
    labels: &[S],
    features: &ChordFeatures,
    min_duration: f32,
) -> Vec<ChordSegment> {
    let merged: Vec<ChordSegment> = merge_runs(frame_segments(labels, features)).collect();
    absorb_short_segments(merged, min_duration)
}
