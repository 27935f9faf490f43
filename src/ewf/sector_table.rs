//! Generic sector-range table, reused for session ranges, acquisition-error
//! ranges (`error2`/`session` sections) and the in-memory CRC-error table
//! the read path feeds on a verification failure. Adjacent ranges are
//! coalesced on insert, matching the original `libewf_sector_table_add`
//! behavior instead of growing one entry per call.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorRange {
    pub first_sector: u64,
    pub number_of_sectors: u64,
}

impl SectorRange {
    pub fn end(&self) -> u64 {
        self.first_sector + self.number_of_sectors
    }
}

#[derive(Debug, Clone, Default)]
pub struct SectorRangeTable {
    ranges: Vec<SectorRange>,
}

impl SectorRangeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `[first_sector, first_sector + number_of_sectors)`, merging
    /// with an existing range if it is adjacent to or overlaps one.
    pub fn add(&mut self, first_sector: u64, number_of_sectors: u64) {
        if number_of_sectors == 0 {
            return;
        }
        let mut new_range = SectorRange {
            first_sector,
            number_of_sectors,
        };

        let mut merged_any = true;
        while merged_any {
            merged_any = false;
            let mut i = 0;
            while i < self.ranges.len() {
                let existing = self.ranges[i];
                let touching = new_range.first_sector <= existing.end()
                    && existing.first_sector <= new_range.end();
                if touching {
                    let start = new_range.first_sector.min(existing.first_sector);
                    let end = new_range.end().max(existing.end());
                    new_range = SectorRange {
                        first_sector: start,
                        number_of_sectors: end - start,
                    };
                    self.ranges.remove(i);
                    merged_any = true;
                    continue;
                }
                i += 1;
            }
        }
        let insert_at = self
            .ranges
            .iter()
            .position(|r| r.first_sector > new_range.first_sector)
            .unwrap_or(self.ranges.len());
        self.ranges.insert(insert_at, new_range);
    }

    pub fn ranges(&self) -> &[SectorRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }
}
