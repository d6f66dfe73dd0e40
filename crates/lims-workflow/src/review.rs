//! 结果审核聚合
//!
//! 把一次就诊的观察记录按目标订单过滤后，按检验概念分组，
//! 供审批对话框渲染。分组是纯函数；参考范围与单位通过概念
//! 元数据服务按需查询。

use async_trait::async_trait;
use lims_core::{ConceptMeta, MutationNotifier, Observation, Result};
use tracing::warn;
use uuid::Uuid;

/// 概念元数据服务（外部协作方）
#[async_trait]
pub trait ConceptSource: Send + Sync {
    async fn get_concept_by_id(&self, concept_uuid: Uuid) -> Result<ConceptMeta>;
}

/// 订单审批（外部协作方，单次调用）
#[async_trait]
pub trait OrderApprover: Send + Sync {
    async fn approve(&self, order_id: Uuid) -> Result<()>;
}

/// 一个检验概念下的结果分组
#[derive(Debug, Clone)]
pub struct ResultGroup {
    pub test: String,
    pub observation: Observation,
}

/// 渲染后的单行结果
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub test: String,
    pub value: String,
    pub reference_range: String,
    pub units: String,
}

/// 按检验概念分组目标订单的观察记录
///
/// 保留概念首次出现的顺序；同一概念重复出现时保留位置、
/// 以较新的观察记录覆盖内容。
pub fn group_results(observations: &[Observation], order_id: Uuid) -> Vec<ResultGroup> {
    let mut groups: Vec<ResultGroup> = Vec::new();

    for obs in observations
        .iter()
        .filter(|obs| obs.order_uuid == Some(order_id))
    {
        let display = &obs.concept.display;
        if let Some(existing) = groups.iter_mut().find(|g| &g.test == display) {
            existing.observation = obs.clone();
        } else {
            groups.push(ResultGroup {
                test: display.clone(),
                observation: obs.clone(),
            });
        }
    }

    groups
}

impl ResultGroup {
    /// 渲染分组为结果行
    ///
    /// 有子观察（group members）时每个子项独立成行，参考范围与
    /// 单位按其概念查询；没有子观察时分组自身的值就是唯一一行，
    /// 与分组id是否存在无关。缺失的范围/单位渲染为 "N/A"。
    pub async fn rows(&self, concepts: &dyn ConceptSource) -> Vec<ResultRow> {
        if self.observation.group_members.is_empty() {
            if self.observation.value.is_none() {
                // 分组概念但子项在传输中丢失：数据质量问题，仍渲染单行
                warn!(
                    "Observation {} for test '{}' has neither group members nor a value",
                    self.observation.uuid, self.test
                );
            }
            let row = Self::render_row(&self.observation, concepts).await;
            return vec![row];
        }

        let mut rows = Vec::with_capacity(self.observation.group_members.len());
        for member in &self.observation.group_members {
            rows.push(Self::render_row(member, concepts).await);
        }
        rows
    }

    async fn render_row(obs: &Observation, concepts: &dyn ConceptSource) -> ResultRow {
        let meta = match concepts.get_concept_by_id(obs.concept.uuid).await {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!("Concept lookup failed for {}: {}", obs.concept.uuid, e);
                None
            }
        };

        let (reference_range, units) = match meta {
            Some(meta) => {
                let range = match (meta.low_normal, meta.hi_normal) {
                    (Some(low), Some(hi)) => format!("{} : {}", low, hi),
                    // 未定义的参考范围报告为"不适用"，而非报错
                    _ => "N/A".to_string(),
                };
                (range, meta.units.unwrap_or_else(|| "N/A".to_string()))
            }
            None => ("N/A".to_string(), "N/A".to_string()),
        };

        ResultRow {
            test: obs.concept.display.clone(),
            value: obs
                .value
                .as_ref()
                .map(|v| v.display())
                .unwrap_or_else(|| "--".to_string()),
            reference_range,
            units,
        }
    }
}

/// 一次审核会话
///
/// 审批成功后会话即被丢弃（消费self），没有本地撤销。
pub struct ReviewSession {
    order_id: Uuid,
    groups: Vec<ResultGroup>,
}

impl ReviewSession {
    pub fn new(observations: &[Observation], order_id: Uuid) -> Self {
        Self {
            order_id,
            groups: group_results(observations, order_id),
        }
    }

    pub fn groups(&self) -> &[ResultGroup] {
        &self.groups
    }

    /// 审批订单
    pub async fn approve(
        self,
        approver: &dyn OrderApprover,
        notifier: &dyn MutationNotifier,
    ) -> Result<()> {
        approver.approve(self.order_id).await?;
        tracing::info!("Order {} approved", self.order_id);
        notifier.invalidate("lab-orders").await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lims_core::{ConceptRef, LimsError, ObsValue};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeConcepts {
        metas: HashMap<Uuid, ConceptMeta>,
    }

    #[async_trait]
    impl ConceptSource for FakeConcepts {
        async fn get_concept_by_id(&self, concept_uuid: Uuid) -> Result<ConceptMeta> {
            self.metas
                .get(&concept_uuid)
                .cloned()
                .ok_or_else(|| LimsError::NotFound(concept_uuid.to_string()))
        }
    }

    struct RecordingNotifier {
        keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MutationNotifier for RecordingNotifier {
        async fn invalidate(&self, resource_key: &str) {
            self.keys.lock().unwrap().push(resource_key.to_string());
        }
    }

    struct OkApprover;

    #[async_trait]
    impl OrderApprover for OkApprover {
        async fn approve(&self, _order_id: Uuid) -> Result<()> {
            Ok(())
        }
    }

    fn obs(test: &str, order_id: Option<Uuid>, value: Option<ObsValue>) -> Observation {
        Observation {
            uuid: Uuid::new_v4(),
            concept: ConceptRef {
                uuid: Uuid::new_v4(),
                display: test.to_string(),
            },
            order_uuid: order_id,
            value,
            group_members: Vec::new(),
            display: test.to_string(),
        }
    }

    #[test]
    fn test_grouping_preserves_first_seen_order() {
        let order_id = Uuid::new_v4();
        let other_order = Uuid::new_v4();
        let observations = vec![
            obs("Hemoglobin", Some(order_id), Some(ObsValue::Numeric(13.5))),
            obs("WBC", Some(order_id), Some(ObsValue::Numeric(6.2))),
            obs("Creatinine", Some(other_order), Some(ObsValue::Numeric(1.0))),
            obs("Hemoglobin", Some(order_id), Some(ObsValue::Numeric(13.9))),
        ];

        let groups = group_results(&observations, order_id);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].test, "Hemoglobin");
        assert_eq!(groups[1].test, "WBC");
        // 重复概念保留位置、内容取较新一条
        assert_eq!(
            groups[0].observation.value,
            Some(ObsValue::Numeric(13.9))
        );
    }

    #[tokio::test]
    async fn test_grouped_observation_renders_member_rows() {
        let order_id = Uuid::new_v4();
        let mut panel = obs("Full Blood Count", Some(order_id), None);
        let member_a = obs("Hemoglobin", None, Some(ObsValue::Numeric(13.5)));
        let member_b = obs("WBC", None, Some(ObsValue::Numeric(6.2)));

        let mut metas = HashMap::new();
        metas.insert(
            member_a.concept.uuid,
            ConceptMeta {
                units: Some("g/dL".to_string()),
                low_normal: Some(12.0),
                hi_normal: Some(16.0),
            },
        );
        panel.group_members = vec![member_a, member_b];

        let groups = group_results(&[panel], order_id);
        let rows = groups[0].rows(&FakeConcepts { metas }).await;

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].reference_range, "12 : 16");
        assert_eq!(rows[0].units, "g/dL");
        // 元数据缺失的成员渲染为 N/A，不报错
        assert_eq!(rows[1].reference_range, "N/A");
        assert_eq!(rows[1].units, "N/A");
    }

    #[tokio::test]
    async fn test_ungrouped_observation_is_single_row() {
        let order_id = Uuid::new_v4();
        let single = obs(
            "Malaria Smear",
            Some(order_id),
            Some(ObsValue::Coded {
                display: "Negative".to_string(),
            }),
        );
        let mut metas = HashMap::new();
        metas.insert(
            single.concept.uuid,
            ConceptMeta {
                units: None,
                low_normal: None,
                hi_normal: None,
            },
        );

        let groups = group_results(&[single], order_id);
        let rows = groups[0].rows(&FakeConcepts { metas }).await;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, "Negative");
        assert_eq!(rows[0].reference_range, "N/A");
    }

    #[tokio::test]
    async fn test_approve_discards_session_and_invalidates() {
        let order_id = Uuid::new_v4();
        let session = ReviewSession::new(&[], order_id);
        let notifier = RecordingNotifier {
            keys: Mutex::new(Vec::new()),
        };

        session.approve(&OkApprover, &notifier).await.unwrap();
        assert_eq!(*notifier.keys.lock().unwrap(), vec!["lab-orders"]);
    }
}
