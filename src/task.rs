// 该文件是 Mianxiang （面相） 项目的一部分。
// src/task.rs - 帧循环任务
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

use std::{
  sync::mpsc::{self, Receiver},
  thread,
  time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
  annotate::FaceAnnotator, classify::Classifier, detection::Detector, frame::Frame,
  output::Render,
};

/// 收到中断信号后等待主循环退出的最长时间
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

/// 任务以所有权方式接管输入、标注器与输出，返回时统一释放
pub trait Task<I, D, C, O>: Sized {
  type Error;
  fn run_task(self, input: I, annotator: FaceAnnotator<D, C>, output: O)
  -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
  Running,
  Stopped,
}

/// 只处理第一张非空帧
pub struct OneShotTask;

impl<I, D, C, O, DE, CE, RE> Task<I, D, C, O> for OneShotTask
where
  I: Iterator<Item = Frame>,
  D: Detector<Error = DE>,
  C: Classifier<Error = CE>,
  O: Render<Error = RE>,
  DE: std::error::Error + Send + Sync + 'static,
  CE: std::error::Error + Send + Sync + 'static,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    annotator: FaceAnnotator<D, C>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let mut frame = input
      .find(|frame| !frame.is_empty())
      .ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功: {}x{}", frame.width(), frame.height());

    let now = Instant::now();
    let faces = annotator.annotate(&mut frame.image, &output)?;
    info!("标注完成，共 {} 张人脸，耗时: {:.2?}", faces.len(), now.elapsed());
    output.render_result(&frame, &faces)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 连续处理帧，直到输入结束或收到停止请求
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  interrupt: Option<Receiver<()>>,
}

impl ContinuousTask {
  /// 处理指定数量的帧后停止
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 安装 Ctrl-C 处理器，每个进程只能安装一次
  pub fn with_ctrlc(mut self) -> Result<Self, ctrlc::Error> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(FORCE_EXIT_AFTER);
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;
    self.interrupt = Some(rx);
    Ok(self)
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .is_some_and(|rx| rx.try_recv().is_ok())
  }

  /// 执行一次循环迭代
  pub fn step<I, D, C, O>(
    &self,
    input: &mut I,
    annotator: &FaceAnnotator<D, C>,
    output: &O,
    processed: &mut usize,
  ) -> anyhow::Result<LoopState>
  where
    I: Iterator<Item = Frame>,
    D: Detector,
    C: Classifier,
    O: Render,
    D::Error: std::error::Error + Send + Sync + 'static,
    C::Error: std::error::Error + Send + Sync + 'static,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    let Some(mut frame) = input.next() else {
      info!("输入流结束");
      return Ok(LoopState::Stopped);
    };

    if frame.is_empty() {
      debug!("第 {} 帧为空，跳过", frame.index);
      return Ok(LoopState::Running);
    }

    let now = Instant::now();
    let faces = annotator.annotate(&mut frame.image, output)?;
    let elapsed_a = now.elapsed();
    output.render_result(&frame, &faces)?;
    let elapsed_b = now.elapsed();

    *processed += 1;
    info!(
      "处理第 {} 帧，{} 张人脸，耗时: {:.2?} / {:.2?}",
      *processed,
      faces.len(),
      elapsed_a,
      elapsed_b
    );

    if self.frame_number.is_some_and(|n| *processed >= n) {
      info!("达到指定帧数 {}, 退出任务循环", *processed);
      return Ok(LoopState::Stopped);
    }
    if output.poll_stop() {
      info!("输出端请求停止，退出任务循环");
      return Ok(LoopState::Stopped);
    }
    if self.interrupted() {
      warn!("中断信号接收，退出任务循环");
      return Ok(LoopState::Stopped);
    }

    Ok(LoopState::Running)
  }
}

impl<I, D, C, O, DE, CE, RE> Task<I, D, C, O> for ContinuousTask
where
  I: Iterator<Item = Frame>,
  D: Detector<Error = DE>,
  C: Classifier<Error = CE>,
  O: Render<Error = RE>,
  DE: std::error::Error + Send + Sync + 'static,
  CE: std::error::Error + Send + Sync + 'static,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    annotator: FaceAnnotator<D, C>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");

    let mut processed = 0usize;
    let mut state = LoopState::Running;
    while state == LoopState::Running {
      state = self.step(&mut input, &annotator, &output, &mut processed)?;
    }

    info!("任务完成，共处理 {} 帧，释放资源", processed);
    Ok(())
  }
}
