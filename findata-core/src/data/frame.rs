//! Polars conversion helpers shared by the providers and the store.

use super::align::Aligned;
use super::provider::CollectError;
use chrono::NaiveDate;
use polars::prelude::*;

/// Name of the date index column in every dated table.
pub const DATE_COLUMN: &str = "date";

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

fn polars_err(context: &str) -> impl Fn(PolarsError) -> CollectError + '_ {
    move |e| CollectError::Parquet(format!("{context}: {e}"))
}

/// Build a Polars `Date` column from calendar dates.
pub fn date_column(name: &str, dates: &[NaiveDate]) -> Result<Column, CollectError> {
    let days: Vec<i32> = dates
        .iter()
        .map(|d| (*d - epoch()).num_days() as i32)
        .collect();
    Column::new(name.into(), days)
        .cast(&DataType::Date)
        .map_err(polars_err("date cast"))
}

/// Build a `date` + value-columns frame from date-aligned series.
pub fn dated_frame(aligned: Aligned<NaiveDate>) -> Result<DataFrame, CollectError> {
    if let Some(label) = aligned.duplicate_label() {
        return Err(CollectError::InvalidRequest(format!(
            "column '{label}' requested more than once"
        )));
    }

    let mut columns = Vec::with_capacity(aligned.columns.len() + 1);
    columns.push(date_column(DATE_COLUMN, &aligned.keys)?);
    for (label, values) in aligned.columns {
        columns.push(Column::new(label.into(), values));
    }
    DataFrame::new(columns).map_err(polars_err("dataframe creation"))
}

/// Read a `Date` column back into calendar dates.
pub fn column_dates(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDate>>, CollectError> {
    let ca = df
        .column(name)
        .map_err(polars_err("column read"))?
        .date()
        .map_err(polars_err("date column type"))?;

    Ok((0..ca.len())
        .map(|i| ca.get(i).map(|days| epoch() + chrono::Duration::days(days as i64)))
        .collect())
}

/// Read a `Float64` column back into optional values.
pub fn column_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, CollectError> {
    let ca = df
        .column(name)
        .map_err(polars_err("column read"))?
        .f64()
        .map_err(polars_err("float column type"))?;
    Ok((0..ca.len()).map(|i| ca.get(i)).collect())
}

/// First and last date of a table's `date` column, if it has one.
pub fn date_bounds(df: &DataFrame) -> Option<(NaiveDate, NaiveDate)> {
    let dates = column_dates(df, DATE_COLUMN).ok()?;
    let mut present = dates.into_iter().flatten();
    let first = present.next()?;
    Some(present.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
}
