use crate::flash::{ChipProfile, DeviceSegment};

/// Builder for creating test ChipProfile instances
pub struct ChipProfileBuilder {
    name: String,
    chip: String,
    segments: Vec<DeviceSegment>,
}

impl ChipProfileBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            chip: "esp32".to_string(),
            segments: Vec::new(),
        }
    }

    pub fn chip(mut self, chip: &str) -> Self {
        self.chip = chip.to_string();
        self
    }

    pub fn segment(mut self, label: &str, offset: &str, size: &str, required: bool) -> Self {
        self.segments.push(DeviceSegment {
            label: label.to_string(),
            offset: offset.to_string(),
            size: size.to_string(),
            required,
        });
        self
    }

    /// Bootloader, partition table and application at the usual ESP32 offsets.
    pub fn esp32_layout(self) -> Self {
        self.segment("boot", "0x1000", "0x7000", true)
            .segment("partitions", "0x8000", "0x1000", true)
            .segment("app", "0x10000", "0x1F0000", true)
    }

    pub fn build(self) -> ChipProfile {
        ChipProfile {
            name: self.name,
            chip: self.chip,
            segments: self.segments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_segment_order() {
        let profile = ChipProfileBuilder::new("RX")
            .esp32_layout()
            .segment("nvs", "0x9000", "0x5000", false)
            .build();

        let labels: Vec<&str> = profile.segments.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["boot", "partitions", "app", "nvs"]);
        assert!(!profile.segments[3].required);
    }
}
