// 该文件是 Qianli （千里眼） 项目的一部分。
// src/scheduler.rs - 帧调度（背压丢帧）
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::sync::{
  Arc,
  atomic::{AtomicBool, AtomicU64, Ordering},
};

use tracing::trace;

/// 调度统计，恒有 `admitted + dropped == arrived`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
  pub arrived: u64,
  pub admitted: u64,
  pub dropped: u64,
}

#[derive(Debug, Default)]
struct SchedulerState {
  busy: AtomicBool,
  admitted: AtomicU64,
  dropped: AtomicU64,
}

/// 帧调度器：同一时刻最多只有一帧在推理
///
/// 忙碌时到达的帧直接丢弃而不排队，保证下一帧总是最新的。
#[derive(Debug, Clone, Default)]
pub struct FrameScheduler {
  state: Arc<SchedulerState>,
}

/// 准入许可，释放时调度器回到空闲状态
#[derive(Debug)]
#[must_use = "许可释放后调度器立即回到空闲状态"]
pub struct Permit {
  state: Arc<SchedulerState>,
}

impl Drop for Permit {
  fn drop(&mut self) {
    self.state.busy.store(false, Ordering::Release);
  }
}

impl FrameScheduler {
  pub fn new() -> Self {
    Self::default()
  }

  /// 尝试接纳一帧：Idle -> Busy 成功时返回许可，否则计入丢帧
  pub fn try_admit(&self) -> Option<Permit> {
    match self
      .state
      .busy
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
    {
      Ok(_) => {
        self.state.admitted.fetch_add(1, Ordering::Relaxed);
        Some(Permit {
          state: self.state.clone(),
        })
      }
      Err(_) => {
        let dropped = self.state.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("推理忙碌，丢弃帧（累计 {}）", dropped);
        None
      }
    }
  }

  pub fn is_busy(&self) -> bool {
    self.state.busy.load(Ordering::Acquire)
  }

  pub fn stats(&self) -> SchedulerStats {
    let admitted = self.state.admitted.load(Ordering::Relaxed);
    let dropped = self.state.dropped.load(Ordering::Relaxed);
    SchedulerStats {
      arrived: admitted + dropped,
      admitted,
      dropped,
    }
  }
}
