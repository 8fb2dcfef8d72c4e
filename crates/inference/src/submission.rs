//! `info.csv` in, submission table out.

use anyhow::Context;
use std::path::{Path, PathBuf};

pub const IMAGE_ID_COLUMN: &str = "ImageID";
pub const ANSWER_COLUMN: &str = "ans";

/// All rows of an info table, with the position of the image id column.
#[derive(Debug, Clone)]
pub struct InfoTable {
    pub headers: csv::StringRecord,
    pub rows: Vec<csv::StringRecord>,
    id_column: usize,
}

impl InfoTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn image_ids(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(move |row| row.get(self.id_column).unwrap_or_default())
    }

    /// Image paths in table order.
    pub fn image_paths(&self, image_dir: &Path) -> Vec<PathBuf> {
        self.image_ids().map(|id| image_dir.join(id)).collect()
    }
}

pub fn read_info(path: &Path) -> anyhow::Result<InfoTable> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let id_column = headers
        .iter()
        .position(|h| h == IMAGE_ID_COLUMN)
        .ok_or_else(|| {
            anyhow::anyhow!("{} has no `{IMAGE_ID_COLUMN}` column", path.display())
        })?;
    let rows = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(InfoTable {
        headers,
        rows,
        id_column,
    })
}

/// Write every input column with `ans` filled from `answers`; the column is
/// appended when the info table does not already carry one.
pub fn write_submission(path: &Path, info: &InfoTable, answers: &[u8]) -> anyhow::Result<()> {
    if answers.len() != info.len() {
        anyhow::bail!(
            "{} predictions for {} info rows",
            answers.len(),
            info.len()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let answer_column = info.headers.iter().position(|h| h == ANSWER_COLUMN);
    let mut headers = info.headers.clone();
    if answer_column.is_none() {
        headers.push_field(ANSWER_COLUMN);
    }
    writer.write_record(&headers)?;
    for (row, answer) in info.rows.iter().zip(answers) {
        let answer = answer.to_string();
        let mut fields: Vec<&str> = row.iter().collect();
        match answer_column {
            Some(col) if col < fields.len() => fields[col] = &answer,
            _ => fields.push(&answer),
        }
        writer.write_record(&fields)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_existing_answer_column_in_row_order() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let info_path = tmp.path().join("info.csv");
        std::fs::write(&info_path, "ImageID,ans\nb.jpg,0\na.jpg,0\n")?;
        let info = read_info(&info_path)?;
        assert_eq!(info.image_ids().collect::<Vec<_>>(), vec!["b.jpg", "a.jpg"]);

        let out = tmp.path().join("out/submission.csv");
        write_submission(&out, &info, &[17, 4])?;
        let written = std::fs::read_to_string(&out)?;
        assert_eq!(written, "ImageID,ans\nb.jpg,17\na.jpg,4\n");
        Ok(())
    }

    #[test]
    fn appends_answer_column_when_absent() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let info_path = tmp.path().join("info.csv");
        std::fs::write(&info_path, "ImageID,group\nx.png,a\n")?;
        let info = read_info(&info_path)?;
        let out = tmp.path().join("submission.csv");
        write_submission(&out, &info, &[9])?;
        assert_eq!(std::fs::read_to_string(&out)?, "ImageID,group,ans\nx.png,a,9\n");
        Ok(())
    }

    #[test]
    fn missing_id_column_is_rejected() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let info_path = tmp.path().join("info.csv");
        std::fs::write(&info_path, "image,label\nx.jpg,1\n")?;
        let err = read_info(&info_path).unwrap_err();
        assert!(err.to_string().contains("ImageID"));
        Ok(())
    }

    #[test]
    fn prediction_count_must_match_rows() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let info_path = tmp.path().join("info.csv");
        std::fs::write(&info_path, "ImageID\nx.jpg\n")?;
        let info = read_info(&info_path)?;
        assert!(write_submission(&tmp.path().join("s.csv"), &info, &[]).is_err());
        Ok(())
    }
}
