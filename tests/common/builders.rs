//! Test data builders for creating frame streams

use chords_recorder::types::{CounterPosition, Frame};

/// Builder for a run of frames with a wrapping counter
pub struct FrameStreamBuilder {
    channels: usize,
    start: u8,
    count: usize,
    position: CounterPosition,
    skip: Vec<usize>,
}

impl FrameStreamBuilder {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            start: 0,
            count: 10,
            position: CounterPosition::Trailing,
            skip: Vec::new(),
        }
    }

    /// Counter value of the first frame
    pub fn start(mut self, start: u8) -> Self {
        self.start = start;
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn position(mut self, position: CounterPosition) -> Self {
        self.position = position;
        self
    }

    /// Leave out the frame at this offset, as if lost in transit
    pub fn drop_at(mut self, offset: usize) -> Self {
        self.skip.push(offset);
        self
    }

    pub fn build(self) -> Vec<Frame> {
        (0..self.count)
            .filter(|i| !self.skip.contains(i))
            .map(|i| {
                let counter = self.start.wrapping_add(i as u8) as f64;
                let samples = (0..self.channels).map(|ch| (i * 10 + ch) as f64);
                let values = match self.position {
                    CounterPosition::Leading => std::iter::once(counter).chain(samples).collect(),
                    CounterPosition::Trailing => samples.chain(std::iter::once(counter)).collect(),
                };
                Frame::new(values)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_stream_builder() {
        let frames = FrameStreamBuilder::new(2).start(254).count(4).drop_at(1).build();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].values(), &[0.0, 1.0, 254.0]);
        assert_eq!(frames[1].counter(CounterPosition::Trailing), Some(0));
        assert_eq!(frames[2].counter(CounterPosition::Trailing), Some(1));
    }
}
