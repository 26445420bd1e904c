use taskhub_core::{ScheduleSpec, SchedulerError, SchedulerResult};

use crate::cron_utils::CronScheduler;

/// 校验调度规则，任何越界字段都是注册期的配置错误
pub fn validate_schedule(spec: &ScheduleSpec) -> SchedulerResult<()> {
    match spec {
        ScheduleSpec::Interval(interval) => {
            if interval.every <= 0 {
                return Err(SchedulerError::config_error(format!(
                    "间隔调度的 every 必须大于 0: {}",
                    interval.every
                )));
            }
            if interval.period.duration(interval.every).is_none() {
                return Err(SchedulerError::config_error(format!(
                    "间隔调度超出可表示范围: every {} {}",
                    interval.every, interval.period
                )));
            }
        }
        ScheduleSpec::Crontab(crontab) => {
            CronScheduler::from_crontab(crontab).map_err(|e| match e {
                SchedulerError::InvalidCron { expr, message } => SchedulerError::config_error(
                    format!("crontab 无法生成有效的调度: {expr} - {message}"),
                ),
                other => other,
            })?;
        }
        ScheduleSpec::Solar(solar) => {
            if !(-90.0..=90.0).contains(&solar.latitude) {
                return Err(SchedulerError::config_error(format!(
                    "纬度超出范围 -90..90: {}",
                    solar.latitude
                )));
            }
            if !(-180.0..=180.0).contains(&solar.longitude) {
                return Err(SchedulerError::config_error(format!(
                    "经度超出范围 -180..180: {}",
                    solar.longitude
                )));
            }
        }
    }
    Ok(())
}
