#[cfg(test)]
mod cron_utils_tests {
    use taskhub_core::CrontabSpec;
    use taskhub_dispatcher::cron_utils::*;

    use chrono::{Datelike, TimeZone, Utc, Weekday};

    #[test]
    fn test_first_at_or_after_includes_exact_instant() {
        let scheduler = CronScheduler::new("0 0 * * * *").unwrap();

        let on_the_hour = Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap();
        assert_eq!(scheduler.first_at_or_after(on_the_hour), Some(on_the_hour));

        let just_after = on_the_hour + chrono::Duration::milliseconds(250);
        assert_eq!(
            scheduler.first_at_or_after(just_after),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_crontab_sunday_is_zero() {
        // 2024-01-01 是周一
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let sundays = CronScheduler::from_crontab(
            &CrontabSpec::default().minute("0").hour("8").day_of_week("0"),
        )
        .unwrap();
        let next = sundays.first_at_or_after(now).unwrap();
        assert_eq!(next.weekday(), Weekday::Sun);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 7, 8, 0, 0).unwrap());

        let mondays = CronScheduler::from_crontab(
            &CrontabSpec::default().minute("0").hour("8").day_of_week("1"),
        )
        .unwrap();
        assert_eq!(
            mondays.first_at_or_after(now),
            Some(Utc.with_ymd_and_hms(2024, 1, 8, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_crontab_step_and_range_fields() {
        let spec = CrontabSpec::default()
            .minute("*/20")
            .hour("9-17/4")
            .day_of_month("1,15")
            .month_of_year("1-3");
        assert_eq!(
            crontab_to_cron_expression(&spec).unwrap(),
            "0 0,20,40 9,13,17 1,15 1,2,3 *"
        );

        let scheduler = CronScheduler::from_crontab(&spec).unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 17, 45, 0).unwrap();
        assert_eq!(
            scheduler.first_at_or_after(from),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_crontab_rejects_out_of_range_fields() {
        assert!(CronScheduler::from_crontab(&CrontabSpec::default().minute("60")).is_err());
        assert!(CronScheduler::from_crontab(&CrontabSpec::default().day_of_month("0")).is_err());
        assert!(CronScheduler::from_crontab(&CrontabSpec::default().month_of_year("13")).is_err());
        assert!(CronScheduler::from_crontab(&CrontabSpec::default().hour("a-b")).is_err());
    }
}
