//! Built-in reference data: the companies and the incidents shown before
//! anything has been reported.

use crate::error::StoreError;
use crate::models::{AuthorSnapshot, Company, Incident, UserProfile, USERS};
use crate::phone::avatar_url;
use crate::store::{put, DocumentStore};
use chrono::{DateTime, NaiveDate, Utc};

#[derive(Clone, Debug)]
pub struct Catalog {
    pub companies: Vec<Company>,
    pub incidents: Vec<Incident>,
}

impl Catalog {
    pub fn builtin() -> Self {
        Self {
            companies: vec![
                company("1", "创新科技", 10, 2),
                company("2", "环球集团", 11, 1),
                company("3", "未来系统", 12, 1),
            ],
            incidents: vec![
                Incident {
                    id: "1".into(),
                    company_id: Some("1".into()),
                    company_name: "创新科技".into(),
                    title: "误导性的环境影响报告".into(),
                    description: "创新科技发布的年度环境报告大幅低报了碳排放。内部文件显示实际排放量几乎是报告值的两倍，明显试图误导公众和投资者。".into(),
                    date: seed_date(2023, 10, 15),
                    categories: vec!["Environmental".into(), "Governance".into()],
                    user_id: None,
                    author: Some(static_author("static-user-1", "关心此事的公民")),
                },
                Incident {
                    id: "2".into(),
                    company_id: Some("2".into()),
                    company_name: "环球集团".into(),
                    title: "海外工厂的不公平劳动实践".into(),
                    description: "调查发现，环球集团多家海外供应商让工人在不安全的环境中以极低工资工作，违反国际劳动标准。公司此前声称所有供应商均符合公平劳动法律。".into(),
                    date: seed_date(2023, 9, 20),
                    categories: vec!["Social".into(), "Governance".into()],
                    user_id: None,
                    author: Some(static_author("static-user-2", "工厂吹哨人")),
                },
                Incident {
                    id: "3".into(),
                    company_id: Some("1".into()),
                    company_name: "创新科技".into(),
                    title: "压制负面用户反馈".into(),
                    description: "多方消息证实，创新科技一直在其主产品平台删除负面评价和反馈。此类操纵用户舆情的行为误导了产品质量与客户满意度。".into(),
                    date: seed_date(2023, 11, 1),
                    categories: vec!["Social".into(), "Governance".into()],
                    user_id: None,
                    author: Some(static_author("static-user-3", "失望用户")),
                },
                Incident {
                    id: "4".into(),
                    company_id: Some("3".into()),
                    company_name: "未来系统".into(),
                    title: "数据隐私泄露与不透明披露".into(),
                    description: "未来系统发生重大数据泄露，影响数百万用户。公司在超过六个月后才披露，并在披露时淡化严重性。这种缺乏透明度使用户个人信息面临更高风险。".into(),
                    date: seed_date(2023, 5, 12),
                    categories: vec!["Governance".into(), "Social".into()],
                    user_id: None,
                    author: Some(static_author("static-user-4", "安全分析师")),
                },
            ],
        }
    }

    /// Reference company whose name matches, ignoring case and surrounding space.
    pub fn company_named(&self, name: &str) -> Option<&Company> {
        let wanted = name.trim().to_lowercase();
        self.companies
            .iter()
            .find(|c| c.name.to_lowercase() == wanted)
    }

    pub fn incident(&self, id: &str) -> Option<&Incident> {
        self.incidents.iter().find(|i| i.id == id)
    }

    /// Profiles for the authors of the seed incidents.
    pub fn seed_profiles(&self) -> Vec<UserProfile> {
        self.incidents
            .iter()
            .filter_map(|i| i.author.as_ref())
            .map(|author| UserProfile {
                uid: author.uid.clone(),
                email: None,
                display_name: author.display_name.clone(),
                photo_url: author.photo_url.clone(),
                phone_number: None,
            })
            .collect()
    }
}

/// Writes the seed authors' profiles so demo sessions can post as them.
pub fn write_demo_profiles(store: &dyn DocumentStore, catalog: &Catalog) -> Result<usize, StoreError> {
    let profiles = catalog.seed_profiles();
    for profile in &profiles {
        put(store, USERS, &profile.uid, profile)?;
    }
    tracing::info!(count = profiles.len(), "wrote demo profiles");
    Ok(profiles.len())
}

fn company(id: &str, name: &str, logo_seed: u32, incident_count: u32) -> Company {
    Company {
        id: id.into(),
        name: name.into(),
        logo_url: format!("https://picsum.photos/seed/{logo_seed}/200/200"),
        incident_count,
    }
}

fn static_author(uid: &str, display_name: &str) -> AuthorSnapshot {
    AuthorSnapshot {
        uid: uid.into(),
        display_name: Some(display_name.into()),
        photo_url: Some(avatar_url(uid)),
    }
}

fn seed_date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or_default()
}
