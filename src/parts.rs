//! Part segmentation and part results.

use std::collections::BTreeMap;

use crate::error::{Result, UploadError};
use crate::store::CompletedPart;

/// Highest part count the store accepts for one multipart upload.
pub const MAX_PART_COUNT: u64 = 10_000;

/// One contiguous byte range of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartDescriptor {
    /// 1-based part number.
    pub number: u32,
    /// Byte offset in the source file.
    pub offset: u64,
    /// Byte length of the part.
    pub length: u64,
    /// True only for the final part.
    pub is_last: bool,
}

/// Deterministic split of a file into parts of at most `max_part_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    file_length: u64,
    max_part_size: u64,
}

impl PartPlan {
    pub fn new(file_length: u64, max_part_size: u64) -> Result<Self> {
        if max_part_size < 1 {
            return Err(UploadError::invalid_argument(
                "max_part_size",
                "needs to be greater than 0",
            ));
        }

        let plan = Self {
            file_length,
            max_part_size,
        };
        if plan.raw_part_count() > MAX_PART_COUNT {
            return Err(UploadError::invalid_argument(
                "max_part_size",
                format!(
                    "{} bytes would need {} parts, the store accepts at most {}",
                    file_length,
                    plan.raw_part_count(),
                    MAX_PART_COUNT
                ),
            ));
        }

        Ok(plan)
    }

    pub fn file_length(&self) -> u64 {
        self.file_length
    }

    /// Part estimate reported in progress events: `max(1, floor(L / P))`.
    ///
    /// This undercounts whenever the length is not an exact multiple of the
    /// part size, so the final event may report a part number above it.
    pub fn estimated_parts(&self) -> u32 {
        let estimate = (self.file_length / self.max_part_size).max(1);
        u32::try_from(estimate).unwrap_or(u32::MAX)
    }

    /// Exact number of parts `iter` yields.
    pub fn part_count(&self) -> u32 {
        u32::try_from(self.raw_part_count()).unwrap_or(u32::MAX)
    }

    fn raw_part_count(&self) -> u64 {
        self.file_length.div_ceil(self.max_part_size).max(1)
    }

    pub fn iter(&self) -> Parts {
        Parts {
            plan: *self,
            offset: 0,
            number: 1,
            done: false,
        }
    }
}

impl IntoIterator for &PartPlan {
    type Item = PartDescriptor;
    type IntoIter = Parts;

    fn into_iter(self) -> Parts {
        self.iter()
    }
}

/// Iterator over the parts of a [`PartPlan`].
#[derive(Debug, Clone)]
pub struct Parts {
    plan: PartPlan,
    offset: u64,
    number: u32,
    done: bool,
}

impl Iterator for Parts {
    type Item = PartDescriptor;

    fn next(&mut self) -> Option<PartDescriptor> {
        if self.done {
            return None;
        }

        let remaining = self.plan.file_length - self.offset;
        let length = remaining.min(self.plan.max_part_size);
        let is_last = self.offset + length >= self.plan.file_length;
        let part = PartDescriptor {
            number: self.number,
            offset: self.offset,
            length,
            is_last,
        };

        self.offset += length;
        self.number += 1;
        self.done = is_last;
        Some(part)
    }
}

/// ETags of uploaded parts, keyed by part number.
#[derive(Debug, Clone, Default)]
pub struct PartResults {
    etags: BTreeMap<u32, String>,
}

impl PartResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the ETag for a part, replacing any earlier one.
    pub fn record(&mut self, part_number: u32, etag: impl Into<String>) {
        self.etags.insert(part_number, etag.into());
    }

    pub fn len(&self) -> usize {
        self.etags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.etags.is_empty()
    }

    /// Ordered completion list, only when parts `1..=expected` are all present.
    pub fn completed(&self, expected: u32) -> Result<Vec<CompletedPart>> {
        let missing: Vec<u32> = (1..=expected)
            .filter(|n| !self.etags.contains_key(n))
            .collect();
        if !missing.is_empty() {
            return Err(UploadError::IncompleteParts { missing });
        }

        Ok(self
            .etags
            .range(1..=expected)
            .map(|(&part_number, etag)| CompletedPart {
                part_number,
                etag: etag.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lengths(plan: &PartPlan) -> Vec<u64> {
        plan.iter().map(|p| p.length).collect()
    }

    #[test]
    fn test_uneven_split() {
        let plan = PartPlan::new(15_000_000, 6_000_000).unwrap();
        assert_eq!(lengths(&plan), vec![6_000_000, 6_000_000, 3_000_000]);
        assert_eq!(plan.estimated_parts(), 2);
        assert_eq!(plan.part_count(), 3);

        let parts: Vec<_> = plan.iter().collect();
        assert_eq!(parts[2].offset, 12_000_000);
        assert_eq!(parts.iter().filter(|p| p.is_last).count(), 1);
        assert!(parts[2].is_last);
    }

    #[test]
    fn test_single_small_part() {
        let plan = PartPlan::new(3_000_000, 6_000_000).unwrap();
        let parts: Vec<_> = plan.iter().collect();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].length, 3_000_000);
        assert!(parts[0].is_last);
        assert_eq!(plan.estimated_parts(), 1);
    }

    #[test]
    fn test_exact_multiple() {
        let plan = PartPlan::new(12, 4).unwrap();
        assert_eq!(lengths(&plan), vec![4, 4, 4]);
        assert_eq!(plan.estimated_parts(), 3);
    }

    #[test]
    fn test_empty_file_yields_one_empty_part() {
        let plan = PartPlan::new(0, 6_000_000).unwrap();
        let parts: Vec<_> = plan.iter().collect();
        assert_eq!(
            parts,
            vec![PartDescriptor {
                number: 1,
                offset: 0,
                length: 0,
                is_last: true
            }]
        );
    }

    #[test]
    fn test_rejects_zero_part_size() {
        assert!(matches!(
            PartPlan::new(10, 0),
            Err(UploadError::InvalidArgument { name: "max_part_size", .. })
        ));
    }

    #[test]
    fn test_rejects_too_many_parts() {
        assert!(PartPlan::new(MAX_PART_COUNT, 1).is_ok());
        assert!(PartPlan::new(MAX_PART_COUNT + 1, 1).is_err());
    }

    #[test]
    fn test_completed_requires_contiguous_parts() {
        let mut results = PartResults::new();
        results.record(1, "\"a\"");
        results.record(3, "\"c\"");
        match results.completed(3) {
            Err(UploadError::IncompleteParts { missing }) => assert_eq!(missing, vec![2]),
            other => panic!("expected missing part 2, got {other:?}"),
        }

        results.record(2, "\"b\"");
        let parts = results.completed(3).unwrap();
        let numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicate_etags_keep_both_parts() {
        let mut results = PartResults::new();
        results.record(1, "\"same\"");
        results.record(2, "\"same\"");
        assert_eq!(results.completed(2).unwrap().len(), 2);
    }
}
