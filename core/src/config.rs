use crate::{region::RegionNormalizer, types::Year};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionAliasConfig {
    /// Canonical province (or municipality) label.
    pub region: String,
    /// Substrings that resolve to `region`. The canonical label itself
    /// must be listed so normalization is idempotent.
    pub aliases: Vec<String>,
}

/// Half-open premium band `[low, high)`. `high = None` is unbounded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PremiumTier {
    pub label: String,
    pub low: f64,
    #[serde(default)]
    pub high: Option<f64>,
}

impl PremiumTier {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && self.high.map_or(true, |h| value < h)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiConfig {
    pub default_year: Year,
    pub match_threshold: f64,
    pub unmatched_sample_limit: usize,
    pub region_aliases: Vec<RegionAliasConfig>,
    pub tiers: Vec<PremiumTier>,
    pub grant_labels: Vec<String>,
    pub deduction_labels: Vec<String>,
    pub qualified_label: String,
    /// Rows in the points extract whose id cell starts with this marker are
    /// footnotes, not ledger entries.
    pub note_marker: String,
}

impl Default for KpiConfig {
    fn default() -> Self {
        Self {
            default_year: 2024,
            match_threshold: 0.80,
            unmatched_sample_limit: 10,
            region_aliases: default_region_aliases(),
            tiers: default_tiers(),
            grant_labels: vec!["积分发放".into(), "grant".into()],
            deduction_labels: vec!["积分扣减".into(), "deduction".into()],
            qualified_label: "符合".into(),
            note_marker: "注".into(),
        }
    }
}

impl KpiConfig {
    /// Load a JSON configuration file. Fields absent from the file keep
    /// their built-in defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {path}: {e}"))?;
        let config: KpiConfig = serde_json::from_str(&content)?;
        config.validate()?;
        log::info!(
            "config: loaded {path} ({} regions, {} tiers)",
            config.region_aliases.len(),
            config.tiers.len()
        );
        Ok(config)
    }

    pub fn default_test() -> Self {
        Self::default()
    }

    pub fn tier(&self, label: &str) -> Option<&PremiumTier> {
        self.tiers.iter().find(|t| t.label == label)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            anyhow::bail!(
                "match_threshold must be within [0, 1], got {}",
                self.match_threshold
            );
        }
        for entry in &self.region_aliases {
            if entry.region.is_empty() {
                anyhow::bail!("region alias entry with empty region label");
            }
        }
        let normalizer = RegionNormalizer::from_aliases(&self.region_aliases);
        for label in normalizer.canonical_labels() {
            let resolved = normalizer.normalize(label);
            if resolved != label {
                anyhow::bail!("region label '{label}' normalizes to '{resolved}'");
            }
        }
        Ok(())
    }
}

fn alias_entry(region: &str, aliases: &[&str]) -> RegionAliasConfig {
    RegionAliasConfig {
        region: region.to_string(),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
    }
}

/// Built-in alias table. Order matters: the first alias contained in the
/// input wins, so single-character abbreviations listed early can shadow
/// later city names (e.g. "京" is found inside "南京").
pub fn default_region_aliases() -> Vec<RegionAliasConfig> {
    vec![
        alias_entry("Beijing", &["Beijing", "北京", "京"]),
        alias_entry("Shanghai", &["Shanghai", "上海", "沪"]),
        alias_entry("Guangzhou", &["Guangzhou", "广州", "穗"]),
        alias_entry("Shenzhen", &["Shenzhen", "深圳", "深"]),
        alias_entry(
            "Jiangsu",
            &[
                "Jiangsu", "江苏", "苏", "南京", "苏州", "无锡", "常州", "镇江", "扬州",
                "Nanjing", "Suzhou", "Wuxi", "Changzhou", "Zhenjiang", "Yangzhou",
            ],
        ),
        alias_entry(
            "Zhejiang",
            &[
                "Zhejiang", "浙江", "浙", "杭州", "宁波", "温州", "绍兴",
                "Hangzhou", "Ningbo", "Wenzhou", "Shaoxing",
            ],
        ),
        alias_entry(
            "Guangdong",
            &[
                "Guangdong", "广东", "粤", "东莞", "佛山", "珠海", "中山",
                "Dongguan", "Foshan", "Zhuhai", "Zhongshan",
            ],
        ),
        alias_entry(
            "Shandong",
            &["Shandong", "山东", "鲁", "济南", "青岛", "烟台", "Jinan", "Qingdao", "Yantai"],
        ),
        alias_entry("Sichuan", &["Sichuan", "四川", "川", "成都", "Chengdu"]),
        alias_entry("Hubei", &["Hubei", "湖北", "鄂", "武汉", "Wuhan"]),
        alias_entry("Hunan", &["Hunan", "湖南", "湘", "长沙", "Changsha"]),
        alias_entry("Henan", &["Henan", "河南", "豫", "郑州", "Zhengzhou"]),
        alias_entry("Hebei", &["Hebei", "河北", "冀", "石家庄", "Shijiazhuang"]),
        alias_entry(
            "Fujian",
            &["Fujian", "福建", "闽", "福州", "厦门", "Fuzhou", "Xiamen"],
        ),
        alias_entry("Anhui", &["Anhui", "安徽", "皖", "合肥", "Hefei"]),
        alias_entry(
            "Liaoning",
            &["Liaoning", "辽宁", "辽", "沈阳", "大连", "Shenyang", "Dalian"],
        ),
        alias_entry("Shaanxi", &["Shaanxi", "陕西", "陕", "西安", "Xi'an"]),
        alias_entry("Tianjin", &["Tianjin", "天津", "津"]),
        alias_entry("Chongqing", &["Chongqing", "重庆", "渝"]),
    ]
}

pub fn default_tiers() -> Vec<PremiumTier> {
    let band = |label: &str, low: f64, high: Option<f64>| PremiumTier {
        label: label.to_string(),
        low,
        high,
    };
    vec![
        band("0-50k", 0.0, Some(50_000.0)),
        band("50k-100k", 50_000.0, Some(100_000.0)),
        band("100k-300k", 100_000.0, Some(300_000.0)),
        band("300k-500k", 300_000.0, Some(500_000.0)),
        band("500k+", 500_000.0, None),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_half_open() {
        let config = KpiConfig::default();
        let low = config.tier("50k-100k").unwrap();
        assert!(low.contains(50_000.0));
        assert!(!low.contains(100_000.0));
        assert!(config.tier("500k+").unwrap().contains(9_000_000.0));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: KpiConfig = serde_json::from_str(r#"{ "default_year": 2023 }"#).unwrap();
        assert_eq!(config.default_year, 2023);
        assert_eq!(config.unmatched_sample_limit, 10);
        assert!((config.match_threshold - 0.80).abs() < 1e-12);
        assert_eq!(config.region_aliases.len(), default_region_aliases().len());
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let mut config = KpiConfig::default();
        config.match_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_aliases_pass_validation() {
        assert!(KpiConfig::default().validate().is_ok());
    }

    #[test]
    fn label_shadowed_by_another_entry_rejected() {
        let path = std::env::temp_dir().join(format!(
            "kpi-config-{}.json",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(
            &path,
            r#"{ "region_aliases": [
                { "region": "华东", "aliases": ["江苏"] },
                { "region": "江苏", "aliases": ["华东"] }
            ] }"#,
        )
        .unwrap();
        let result = KpiConfig::load(path.to_str().unwrap());
        let _ = std::fs::remove_file(&path);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("华东"), "unexpected error: {err}");
    }
}
