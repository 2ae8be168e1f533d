//! Dispatch ledger walkthrough: one lorry trip from booking to settlement

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use trip_ledger::utils::{MemoryStorage, RecordingSink};
use trip_ledger::{
    ConsignorInput, DispatchLedger, DriverInput, LedgerConfig, ReportQuery, RequestScope,
    RoutePreset, TransitionRequest, TripForm, TripStatus,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("🚚 Trip Ledger - Dispatch Example\n");

    let sink = RecordingSink::new();
    let mut ledger = DispatchLedger::with_sink(
        MemoryStorage::new(),
        LedgerConfig::default(),
        Arc::new(sink.clone()),
    )?;
    let admin = RequestScope::admin("org1");

    // 1. Register the consignor and the driver
    println!("📇 Registering consignor and driver...");
    let mut consignor_input = ConsignorInput::named("ABC Traders");
    consignor_input.default_routes.push(RoutePreset {
        from: "Salem".to_string(),
        to: "Chennai".to_string(),
        rate_per_ton: BigDecimal::from(2500),
    });
    let consignor = ledger.create_consignor(&admin, &consignor_input).await?;
    let driver = ledger
        .create_driver(
            &admin,
            &DriverInput::new("Murugan", "98400 12345").with_vehicle("tn 30 ab 1234"),
        )
        .await?;
    println!("  ✓ Consignor {} ({})", consignor.name, consignor.id);
    println!(
        "  ✓ Driver {} ({}) on {}",
        driver.name,
        driver.phone,
        driver.vehicle_number.as_deref().unwrap_or("-")
    );
    println!();

    // 2. Preview, then book the trip
    let trip_date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let form = TripForm {
        trip_date: Some(trip_date),
        loading_location: Some("Salem".into()),
        unloading_location: Some("Chennai".into()),
        consignment_item: Some("Cement".into()),
        consignor_id: Some(consignor.id.clone()),
        driver_id: Some(driver.id.clone()),
        loaded_weight: 10.into(),
        driver_rate_per_ton: 2000.into(),
        loading_commission: 500.into(),
        driver_advance: 5000.into(),
        driver_advance_payment_mode: Some("cash".into()),
        billed_weight: 10.into(),
        consignor_rate_per_ton: 2500.into(),
        consignor_advance: 10000.into(),
        ..TripForm::default()
    };

    let preview = ledger.preview_trip(&admin, &form)?;
    println!("🧮 Preview");
    println!("  Hire value:        ₹{}", preview.hire_value);
    println!("  Gross amount:      ₹{}", preview.gross_amount);
    println!("  Commission:        ₹{}", preview.commission);
    println!("  Due to driver:     ₹{}", preview.display_driver_balance());
    println!("  Due from consignor ₹{}", preview.display_consignor_balance());
    println!();

    let trip = ledger.create_trip(&admin, &form).await?;
    println!("📦 Booked trip {} as {}", trip.id, trip.status);

    // 3. Record the balance payment and close the trip
    let mut update = TripForm::from_trip(&trip);
    update.driver_balance_paid = 14500.into();
    update.driver_balance_paid_date = Some(NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());
    update.consignor_balance_received = 15000.into();
    let trip = ledger.update_trip(&admin, &trip.id, &update).await?;
    println!(
        "  ✓ Driver balance now ₹{} ({:?})",
        trip.balances.balance_payable_to_driver, trip.balances.driver_balance_status
    );

    let trip = ledger
        .transition_trip(&admin, &trip.id, TransitionRequest::to(TripStatus::Completed))
        .await?;
    println!("  ✓ Trip {} is {}", trip.id, trip.status);
    println!("  ✓ Driver sync events published: {}", sink.updates().len());
    println!();

    // 4. A hand loan against the driver
    let loan = ledger
        .issue_loan(
            &admin,
            &driver.id,
            BigDecimal::from(3000),
            NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            Some("Tyre replacement".into()),
        )
        .await?;
    ledger
        .record_recovery(
            &admin,
            &loan.id,
            BigDecimal::from(1000),
            NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
        )
        .await?;
    let exposure = ledger.driver_exposure(&admin, &driver.id).await?;
    println!("💸 Driver exposure: ₹{}", exposure.total);
    println!();

    // 5. Settlement for the month
    let query = ReportQuery::between(
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
    );
    let as_of = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
    let report = ledger.settlement_report(&admin, &query, as_of).await?;

    println!("📈 Settlement {} to {}", query.from, query.to);
    if let Some(commission) = &report.commission {
        println!(
            "  Commission expected ₹{}, received ₹{}, pending ₹{}",
            commission.expected, commission.received, commission.pending
        );
    }
    for entry in &report.drivers {
        println!(
            "  Driver {}: payable ₹{}, outstanding ₹{}",
            entry.driver_id, entry.total_payable, entry.outstanding
        );
    }
    for entry in &report.consignors {
        println!(
            "  Consignor {}: invoiced ₹{}, received ₹{}",
            entry.consignor_name.as_deref().unwrap_or(&entry.consignor_key),
            entry.invoiced,
            entry.received
        );
    }
    for bucket in &report.aging.buckets {
        println!("  Aging {:>6}: ₹{}", bucket.label, bucket.amount);
    }
    println!(
        "  Hand loans pending ₹{} across {} loans",
        report.hand_loans.total_pending, report.hand_loans.loan_count
    );
    println!();

    // 6. Slip
    let slip = ledger.slip_snapshot(&admin, &trip.id).await?;
    println!("🧾 Trip slip");
    println!("{}", serde_json::to_string_pretty(&slip)?);

    Ok(())
}
