//! CSV percept logs for offline replay.
//!
//! No header; `#` starts a comment line. The first field selects the row kind:
//!
//! ```text
//! pose,  timestamp_ns, frame_id,  class_id, x, y, z, variance[, support[, name]]
//! image, timestamp_ns, sensor_id, class_id, image_x, image_y[, distance[, support[, name]]]
//! tf,    timestamp_ns, parent, child, x, y, z, qw, qx, qy, qz
//! cmd,   timestamp_ns, command
//! ```
//!
//! Optional fields may be left empty. Malformed rows are skipped with a warning.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail};
use csv::{ReaderBuilder, StringRecord};
use nalgebra::Vector3;
use tracing::warn;

use crate::geometry::{PoseWithCovariance, SE3};
use crate::perception::{ImagePercept, PosePercept};

/// One replayable event.
#[derive(Debug, Clone, PartialEq)]
pub enum PerceptRecord {
    Pose(PosePercept),
    Image(ImagePercept),
    /// `T_parent_child` sample for the transform tree.
    Transform {
        timestamp_ns: u64,
        parent: String,
        child: String,
        transform: SE3,
    },
    Command {
        timestamp_ns: u64,
        command: String,
    },
}

impl PerceptRecord {
    pub fn timestamp_ns(&self) -> u64 {
        match self {
            Self::Pose(p) => p.timestamp_ns,
            Self::Image(p) => p.timestamp_ns,
            Self::Transform { timestamp_ns, .. } | Self::Command { timestamp_ns, .. } => *timestamp_ns,
        }
    }
}

/// Read every record of a log file.
pub fn load_percept_log<P: AsRef<Path>>(path: P) -> Result<Vec<PerceptRecord>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    read_percept_log(file).with_context(|| format!("Failed to read {}", path.display()))
}

/// Read every record from any reader.
pub fn read_percept_log<R: Read>(reader: R) -> Result<Vec<PerceptRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec?;
        if rec.iter().all(str::is_empty) {
            continue;
        }
        match parse_record(&rec) {
            Ok(record) => records.push(record),
            Err(err) => warn!("Skipping percept log row {}: {:#}", line + 1, err),
        }
    }
    Ok(records)
}

fn parse_record(rec: &StringRecord) -> Result<PerceptRecord> {
    let kind = field(rec, 0)?;
    let timestamp_ns: u64 = field(rec, 1)?.parse().context("timestamp")?;
    match kind {
        "pose" => {
            if rec.len() < 8 {
                bail!("pose row needs at least 8 fields, got {}", rec.len());
            }
            let position = Vector3::new(number(rec, 4)?, number(rec, 5)?, number(rec, 6)?);
            let variance = number(rec, 7)?;
            let mut percept = PosePercept::new(
                field(rec, 2)?,
                PoseWithCovariance::from_position(position, variance),
                field(rec, 3)?,
                timestamp_ns,
            );
            percept.support = optional_number(rec, 8)?;
            percept.name = optional_text(rec, 9);
            Ok(PerceptRecord::Pose(percept))
        }
        "image" => {
            if rec.len() < 6 {
                bail!("image row needs at least 6 fields, got {}", rec.len());
            }
            let mut percept = ImagePercept::new(
                field(rec, 2)?,
                number(rec, 4)?,
                number(rec, 5)?,
                field(rec, 3)?,
                timestamp_ns,
            );
            percept.distance = optional_number(rec, 6)?;
            percept.support = optional_number(rec, 7)?;
            percept.name = optional_text(rec, 8);
            Ok(PerceptRecord::Image(percept))
        }
        "tf" => {
            if rec.len() < 11 {
                bail!("tf row needs 11 fields, got {}", rec.len());
            }
            let translation = Vector3::new(number(rec, 4)?, number(rec, 5)?, number(rec, 6)?);
            let transform = SE3::from_quaternion(
                number(rec, 7)?,
                number(rec, 8)?,
                number(rec, 9)?,
                number(rec, 10)?,
                translation,
            );
            Ok(PerceptRecord::Transform {
                timestamp_ns,
                parent: field(rec, 2)?.to_string(),
                child: field(rec, 3)?.to_string(),
                transform,
            })
        }
        "cmd" => Ok(PerceptRecord::Command {
            timestamp_ns,
            command: field(rec, 2)?.to_string(),
        }),
        other => bail!("unknown row kind '{}'", other),
    }
}

fn field(rec: &StringRecord, idx: usize) -> Result<&str> {
    rec.get(idx)
        .filter(|f| !f.is_empty())
        .with_context(|| format!("missing field {}", idx))
}

fn number(rec: &StringRecord, idx: usize) -> Result<f64> {
    field(rec, idx)?
        .parse()
        .with_context(|| format!("field {} is not a number", idx))
}

fn optional_number(rec: &StringRecord, idx: usize) -> Result<Option<f64>> {
    match rec.get(idx).filter(|f| !f.is_empty()) {
        Some(_) => number(rec, idx).map(Some),
        None => Ok(None),
    }
}

fn optional_text(rec: &StringRecord, idx: usize) -> Option<String> {
    rec.get(idx).filter(|f| !f.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const LOG: &str = "\
# kind, t, ...
pose,0,map,victim,1.0,2.0,0.0,1.0
pose,1000,map,victim,1.05,2.02,0.0,1.0,0.5,Alice
image,2000,front,hazard,320,240
image,3000,front,hazard,320,240,2.5,,
tf,4000,map,base_link,1.0,0.0,0.0,1.0,0.0,0.0,0.0
cmd,5000,reset
bogus,6000
pose,7000,map,victim,not-a-number,0,0,1
";

    #[test]
    fn test_reads_all_row_kinds() {
        let records = read_percept_log(LOG.as_bytes()).unwrap();
        assert_eq!(records.len(), 6);

        let PerceptRecord::Pose(first) = &records[0] else {
            panic!("expected pose row");
        };
        assert_eq!(first.class_id, "victim");
        assert_eq!(first.frame_id, "map");
        assert_relative_eq!(first.pose.position(), Vector3::new(1.0, 2.0, 0.0));
        assert_eq!(first.support, None);

        let PerceptRecord::Pose(second) = &records[1] else {
            panic!("expected pose row");
        };
        assert_eq!(second.support, Some(0.5));
        assert_eq!(second.name.as_deref(), Some("Alice"));

        let PerceptRecord::Image(image) = &records[3] else {
            panic!("expected image row");
        };
        assert_eq!(image.distance, Some(2.5));
        assert_eq!(image.support, None);

        let PerceptRecord::Transform { parent, child, transform, .. } = &records[4] else {
            panic!("expected tf row");
        };
        assert_eq!((parent.as_str(), child.as_str()), ("map", "base_link"));
        assert_relative_eq!(transform.translation, Vector3::new(1.0, 0.0, 0.0));

        assert_eq!(
            records[5],
            PerceptRecord::Command {
                timestamp_ns: 5000,
                command: "reset".to_string()
            }
        );
        assert_eq!(records[5].timestamp_ns(), 5000);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_percept_log("/nonexistent/percepts.csv").is_err());
    }
}
