//! Stage catalog and start/end/dostep range selection.
//!
//! The catalog order is the only valid execution order. Ranges are closed on
//! both named ends: `--start netModify --end topo` runs netModify and topo and
//! everything between. Internally a selection is stored half-open.
use crate::error::WorkflowError;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// One named unit of the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageName {
    LoadData,
    RefPoint,
    Stacking,
    UnwCor,
    NetModify,
    NetInversion,
    Tropo,
    Deramp,
    Topo,
    ResidRms,
    RefDate,
    Ts2Vel,
    Geocode,
    GoogleEarth,
    HdfEos5,
}

impl StageName {
    /// Full catalog in execution order.
    pub const ALL: [StageName; 15] = [
        StageName::LoadData,
        StageName::RefPoint,
        StageName::Stacking,
        StageName::UnwCor,
        StageName::NetModify,
        StageName::NetInversion,
        StageName::Tropo,
        StageName::Deramp,
        StageName::Topo,
        StageName::ResidRms,
        StageName::RefDate,
        StageName::Ts2Vel,
        StageName::Geocode,
        StageName::GoogleEarth,
        StageName::HdfEos5,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageName::LoadData => "loadData",
            StageName::RefPoint => "refPoint",
            StageName::Stacking => "stacking",
            StageName::UnwCor => "unwCor",
            StageName::NetModify => "netModify",
            StageName::NetInversion => "netInversion",
            StageName::Tropo => "tropo",
            StageName::Deramp => "deramp",
            StageName::Topo => "topo",
            StageName::ResidRms => "residRms",
            StageName::RefDate => "refDate",
            StageName::Ts2Vel => "ts2vel",
            StageName::Geocode => "geocode",
            StageName::GoogleEarth => "googleEarth",
            StageName::HdfEos5 => "hdfEos5",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = WorkflowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        StageName::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == value)
            .ok_or_else(|| unknown_step(value, &StageName::ALL))
    }
}

/// Comma-separated catalog names for diagnostics.
pub fn catalog_listing(catalog: &[StageName]) -> String {
    catalog
        .iter()
        .map(|stage| stage.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn unknown_step(value: &str, catalog: &[StageName]) -> WorkflowError {
    WorkflowError::UnknownStep {
        value: value.to_string(),
        available: catalog_listing(catalog),
    }
}

/// Contiguous slice of the catalog selected for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSelection {
    start: usize,
    end: usize,
}

impl StageSelection {
    /// Half-open index range over the catalog.
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn stages<'a>(&self, catalog: &'a [StageName]) -> &'a [StageName] {
        &catalog[self.range()]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

fn position(catalog: &[StageName], value: Option<&str>) -> Result<Option<usize>, WorkflowError> {
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    let stage = value
        .parse::<StageName>()
        .map_err(|_| unknown_step(value, catalog))?;
    catalog
        .iter()
        .position(|candidate| *candidate == stage)
        .map(Some)
        .ok_or_else(|| unknown_step(value, catalog))
}

/// Compute the stages to run from the `--start`, `--end` and `--dostep` values.
///
/// All three are validated before `do_step` collapses the range, so a bad
/// `start` still fails alongside a good `do_step`. Unset or empty values fall
/// back to the first and last catalog entries.
pub fn select_range(
    catalog: &[StageName],
    start: Option<&str>,
    end: Option<&str>,
    do_step: Option<&str>,
) -> Result<StageSelection, WorkflowError> {
    let start_idx = position(catalog, start)?;
    let end_idx = position(catalog, end)?;
    let do_idx = position(catalog, do_step)?;

    if let Some(idx) = do_idx {
        return Ok(StageSelection {
            start: idx,
            end: idx + 1,
        });
    }

    let first = start_idx.unwrap_or(0);
    let last = match end_idx {
        Some(idx) => idx + 1,
        None => catalog.len(),
    };
    if first >= last && !catalog.is_empty() {
        return Err(WorkflowError::InvalidRange {
            start: catalog[first].to_string(),
            end: catalog[last - 1].to_string(),
        });
    }
    Ok(StageSelection {
        start: first,
        end: last,
    })
}
