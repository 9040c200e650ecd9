//! Pose record model and record-at-a-time readers.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::artifact::ArtifactFormat;
use crate::utils::fs::io_error;
use crate::{Error, Result};

/// One tracked person in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub track_id: i64,
    pub timestamp: String,
    pub keypoints: Keypoints,
}

/// Keypoint name to `[x, y]`, in the order the worker wrote them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Keypoints(Vec<(String, Vec<f64>)>);

impl Keypoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, point: Vec<f64>) {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = point,
            None => self.0.push((name, point)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, point)| point.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Keypoints {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, point) in &self.0 {
            map.serialize_entry(name, point)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Keypoints {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct KeypointsVisitor;

        impl<'de> Visitor<'de> for KeypointsVisitor {
            type Value = Keypoints;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of keypoint name to [x, y]")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut keypoints = Keypoints(Vec::with_capacity(access.size_hint().unwrap_or(17)));
                while let Some((name, point)) = access.next_entry::<String, Vec<f64>>()? {
                    keypoints.insert(name, point);
                }
                Ok(keypoints)
            }
        }

        deserializer.deserialize_map(KeypointsVisitor)
    }
}

/// Feed every top-level array element of a stored series to `f`.
///
/// MessagePack files are decoded one element at a time; JSON files are parsed
/// whole since serde_json has no streaming array reader.
pub fn for_each_record<T, F>(path: &Path, format: ArtifactFormat, mut f: F) -> Result<usize>
where
    T: serde::de::DeserializeOwned,
    F: FnMut(T) -> Result<()>,
{
    let file = File::open(path).map_err(|e| io_error("opening series", path, e))?;
    let mut reader = BufReader::new(file);

    match format {
        ArtifactFormat::MessagePack => {
            let len = rmp::decode::read_array_len(&mut reader)?;
            for _ in 0..len {
                f(read_msgpack_value(&mut reader)?)?;
            }
            Ok(len as usize)
        }
        ArtifactFormat::Json => {
            let records: Vec<T> = serde_json::from_reader(reader)?;
            let len = records.len();
            for record in records {
                f(record)?;
            }
            Ok(len)
        }
        other => Err(Error::Decode(format!(
            "cannot read records from .{} files",
            other.extension()
        ))),
    }
}

fn read_msgpack_value<T, R>(reader: &mut R) -> Result<T>
where
    T: serde::de::DeserializeOwned,
    R: Read,
{
    Ok(rmp_serde::from_read(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(track_id: i64, timestamp: &str, points: &[(&str, f64, f64)]) -> PoseRecord {
        let mut keypoints = Keypoints::new();
        for (name, x, y) in points {
            keypoints.insert(*name, vec![*x, *y]);
        }
        PoseRecord {
            track_id,
            timestamp: timestamp.to_string(),
            keypoints,
        }
    }

    #[test]
    fn test_keypoint_order_survives_json() {
        let json = r#"{"track_id":1,"timestamp":"0.04s","keypoints":{"nose":[1.0,2.0],"left_eye":[3.0,4.0],"ankle":[5.0,6.0]}}"#;
        let parsed: PoseRecord = serde_json::from_str(json).unwrap();
        let names: Vec<_> = parsed.keypoints.names().collect();
        assert_eq!(names, ["nose", "left_eye", "ankle"]);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), json);
    }

    #[test]
    fn test_reads_msgpack_one_record_at_a_time() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("m1.msgpack");
        let records = vec![
            record(1, "0.00s", &[("nose", 10.0, 20.0)]),
            record(2, "0.04s", &[("nose", 11.0, 21.0), ("wrist", 1.5, 2.5)]),
        ];
        std::fs::write(&path, rmp_serde::to_vec_named(&records).unwrap()).unwrap();

        let mut seen = Vec::new();
        let count = for_each_record(&path, ArtifactFormat::MessagePack, |r: PoseRecord| {
            seen.push(r);
            Ok(())
        })
        .unwrap();

        assert_eq!(count, 2);
        assert_eq!(seen, records);
    }

    #[test]
    fn test_truncated_msgpack_is_decode_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("m1.msgpack");
        let records = vec![record(1, "0.00s", &[("nose", 10.0, 20.0)]); 3];
        let bytes = rmp_serde::to_vec_named(&records).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        let result = for_each_record(&path, ArtifactFormat::MessagePack, |_: PoseRecord| Ok(()));
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_unsupported_format_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("m1.png");
        std::fs::write(&path, b"png").unwrap();
        let result = for_each_record(&path, ArtifactFormat::Png, |_: PoseRecord| Ok(()));
        assert!(result.is_err());
    }
}
