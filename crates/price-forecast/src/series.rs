//! Monthly price series and calendar-month arithmetic.

use agro_core::PriceObservation;
use chrono::{Datelike, Months, NaiveDate};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthlyPrice {
    pub year: i32,
    /// 1-12
    pub month: u32,
    /// Mean of the month's observations
    pub price: f64,
}

/// Average observations per calendar month, oldest first. Observations after
/// `as_of` and non-finite or negative prices are ignored.
pub fn monthly_series(history: &[PriceObservation], as_of: NaiveDate) -> Vec<MonthlyPrice> {
    let mut usable: Vec<&PriceObservation> = history
        .iter()
        .filter(|o| o.date <= as_of && o.price.is_finite() && o.price >= 0.0)
        .collect();
    usable.sort_by_key(|o| o.date);

    let mut series: Vec<MonthlyPrice> = Vec::new();
    let mut count = 0usize;
    for obs in usable {
        let (year, month) = (obs.date.year(), obs.date.month());
        match series.last_mut() {
            Some(last) if last.year == year && last.month == month => {
                count += 1;
                last.price += (obs.price - last.price) / count as f64;
            }
            _ => {
                count = 1;
                series.push(MonthlyPrice {
                    year,
                    month,
                    price: obs.price,
                });
            }
        }
    }
    series
}

/// Whole calendar months from `(year, month)` to `(year, month)`.
pub fn months_between(from: (i32, u32), to: (i32, u32)) -> i64 {
    (to.0 - from.0) as i64 * 12 + to.1 as i64 - from.1 as i64
}

/// Monthly step dates after `as_of`, ending exactly on `target`. Always at least one step.
pub fn step_dates(as_of: NaiveDate, target: NaiveDate) -> Vec<NaiveDate> {
    let mut steps = months_between((as_of.year(), as_of.month()), (target.year(), target.month()));
    if target.day() > as_of.day() {
        steps += 1;
    }
    let steps = steps.max(1) as u32;

    let mut dates: Vec<NaiveDate> = (1..steps)
        .filter_map(|h| as_of.checked_add_months(Months::new(h)))
        .filter(|d| *d < target)
        .collect();
    dates.push(target);
    dates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_monthly_means_and_cutoff() {
        let history = vec![
            PriceObservation { date: date(2024, 1, 5), price: 10.0 },
            PriceObservation { date: date(2024, 1, 20), price: 12.0 },
            PriceObservation { date: date(2024, 2, 3), price: 13.0 },
            PriceObservation { date: date(2024, 3, 1), price: f64::NAN },
            PriceObservation { date: date(2024, 4, 1), price: 99.0 },
        ];
        let series = monthly_series(&history, date(2024, 3, 31));
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].price, 11.0);
        assert_eq!(series[1].month, 2);
    }

    #[test]
    fn test_step_dates_end_on_target() {
        let dates = step_dates(date(2024, 1, 15), date(2024, 4, 20));
        assert_eq!(
            dates,
            vec![date(2024, 2, 15), date(2024, 3, 15), date(2024, 4, 15), date(2024, 4, 20)]
        );

        let dates = step_dates(date(2024, 1, 15), date(2024, 4, 10));
        assert_eq!(dates, vec![date(2024, 2, 15), date(2024, 3, 15), date(2024, 4, 10)]);

        assert_eq!(step_dates(date(2024, 1, 15), date(2024, 1, 15)), vec![date(2024, 1, 15)]);
    }

    #[test]
    fn test_months_between() {
        assert_eq!(months_between((2023, 11), (2024, 2)), 3);
        assert_eq!(months_between((2024, 2), (2024, 2)), 0);
    }
}
