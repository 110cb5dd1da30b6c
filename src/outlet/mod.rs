use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// 报告输出
pub trait Outlet {
    async fn save(&self, research_id: &str, markdown: &str) -> Result<PathBuf>;
}

/// Writes `research_report_<id>.md` into the output directory.
pub struct DiskOutlet {
    output_dir: PathBuf,
}

impl DiskOutlet {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn report_path(&self, research_id: &str) -> PathBuf {
        self.output_dir
            .join(format!("research_report_{}.md", research_id))
    }
}

impl Outlet for DiskOutlet {
    async fn save(&self, research_id: &str, markdown: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).await.with_context(|| {
            format!(
                "Failed to create output directory {}",
                self.output_dir.display()
            )
        })?;

        let path = self.report_path(research_id);
        fs::write(&path, markdown)
            .await
            .with_context(|| format!("Failed to write report {}", path.display()))?;

        info!("💾 已保存研究报告: {}", path.display());
        Ok(path)
    }
}
