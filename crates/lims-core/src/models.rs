//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 遗留转诊哨兵文本
///
/// 旧系统在自由文本指令中用该值标记"标本送外部参考实验室"。
/// 摄入时会被提升为显式的 `referral_requested` 标志，之后的
/// 分类逻辑只读标志，不再比较魔法字符串。
pub const REFERRAL_SENTINEL: &str = "Refer to external reference laboratory";

/// 履约状态（执行科室视角的订单生命周期）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillerStatus {
    New,        // 新建
    InProgress, // 处理中
    Completed,  // 已完成
    Exception,  // 异常
    Declined,   // 已拒绝
}

impl FulfillerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Exception => "EXCEPTION",
            Self::Declined => "DECLINED",
        }
    }
}

/// 订单动作
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderAction {
    New,
    Revise,
    Discontinue,
    Renew,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Revise => "REVISE",
            Self::Discontinue => "DISCONTINUE",
            Self::Renew => "RENEW",
        }
    }
}

/// 紧急程度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Routine,
    Stat,
    OnScheduledDate,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routine => "ROUTINE",
            Self::Stat => "STAT",
            Self::OnScheduledDate => "ON_SCHEDULED_DATE",
        }
    }
}

/// 概念引用（检验项目、观察项等）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConceptRef {
    pub uuid: Uuid,
    pub display: String,
}

/// 人员/就诊引用（不持有完整对象，仅用于展示和跳转）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityRef {
    pub uuid: Uuid,
    pub display: String,
}

/// 实验室检验订单
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub accession_number: Option<String>, // 标本登记后才分配
    pub date_activated: DateTime<Utc>,
    pub date_stopped: Option<DateTime<Utc>>, // 录入结果时设置
    pub fulfiller_status: Option<FulfillerStatus>, // 部分填充的记录可能缺失
    pub action: OrderAction,
    pub instructions: Option<String>,
    #[serde(default)]
    pub referral_requested: bool,
    pub urgency: Urgency,
    pub concept: ConceptRef,
    pub orderer: EntityRef,
    pub patient: EntityRef,
    pub encounter: EntityRef,
}

impl Order {
    /// 规范化从远程订单源摄入的记录
    ///
    /// 将遗留的转诊哨兵文本提升为显式标志；原始指令文本保留，
    /// 以便序列化往返不丢失信息。
    pub fn normalized(mut self) -> Self {
        if !self.referral_requested {
            self.referral_requested = self.instructions.as_deref() == Some(REFERRAL_SENTINEL);
        }
        self
    }

    /// 订单是否已转诊至外部参考实验室
    pub fn is_referred(&self) -> bool {
        self.referral_requested
    }

    /// 校验订单不变量
    ///
    /// 不变量: date_stopped 已设置则状态不能是 NEW；
    /// accession_number 已设置意味着标本已登记。
    pub fn validate(&self) -> crate::Result<()> {
        if self.date_stopped.is_some() && self.fulfiller_status == Some(FulfillerStatus::New) {
            return Err(crate::LimsError::Validation(format!(
                "Order {} has date_stopped but fulfiller_status is NEW",
                self.order_number
            )));
        }
        Ok(())
    }
}

/// 观察值
///
/// 远程API的观察值要么是带display的编码对象，要么是数值或文本标量。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ObsValue {
    Coded { display: String },
    Numeric(f64),
    Text(String),
}

impl ObsValue {
    /// 渲染为展示文本
    pub fn display(&self) -> String {
        match self {
            ObsValue::Coded { display } => display.clone(),
            ObsValue::Numeric(n) => n.to_string(),
            ObsValue::Text(s) => s.clone(),
        }
    }
}

/// 观察记录（结果条目）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub uuid: Uuid,
    pub concept: ConceptRef,
    pub order_uuid: Option<Uuid>, // 所属订单
    pub value: Option<ObsValue>,
    #[serde(default)]
    pub group_members: Vec<Observation>,
    pub display: String,
}

/// 概念元数据（单位与参考范围）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConceptMeta {
    pub units: Option<String>,
    pub low_normal: Option<f64>,
    pub hi_normal: Option<f64>,
}

/// 同步状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    NotSynced, // 未同步
    Syncing,   // 同步中
    Synced,    // 已同步
    Failed,    // 失败
}

impl SyncState {
    /// 检查状态转换是否合法
    ///
    /// NOT_SYNCED → SYNCING；SYNCING → SYNCED/FAILED；
    /// FAILED → SYNCING（重试）；SYNCED → SYNCING（重新同步）。
    /// 没有终态，任何记录都可以无限重试。
    pub fn can_transition(self, to: SyncState) -> bool {
        matches!(
            (self, to),
            (SyncState::NotSynced, SyncState::Syncing)
                | (SyncState::Syncing, SyncState::Synced)
                | (SyncState::Syncing, SyncState::Failed)
                | (SyncState::Failed, SyncState::Syncing)
                | (SyncState::Synced, SyncState::Syncing)
        )
    }
}

/// 每个转诊订单的同步跟踪记录
///
/// 由同步协调器独占持有：首次同步时惰性创建，只转换，从不删除。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    pub order_id: Uuid,
    pub sync_state: SyncState,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub remote_reference_id: Option<String>, // 成功时由远端分配
}

impl SyncRecord {
    pub fn new(order_id: Uuid) -> Self {
        Self {
            order_id,
            sync_state: SyncState::NotSynced,
            last_attempt_at: None,
            last_error: None,
            remote_reference_id: None,
        }
    }
}
