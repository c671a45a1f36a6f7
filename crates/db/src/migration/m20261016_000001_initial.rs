//! Initial database migration.
//!
//! Creates the cash ledger, wallet metadata, harvest collection, payout and
//! Harvest/Sale tables. The unique indexes here back the idempotency and
//! exactly-once guarantees of the store.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: CASH LEDGER
        // ============================================================
        db.execute_unprepared(LEDGER_ENTRIES_SQL).await?;
        db.execute_unprepared(WALLET_META_SQL).await?;
        db.execute_unprepared(LEGACY_WALLETS_SQL).await?;

        // ============================================================
        // PART 2: HARVEST COLLECTIONS
        // ============================================================
        db.execute_unprepared(HARVEST_COLLECTIONS_SQL).await?;
        db.execute_unprepared(PICKERS_SQL).await?;
        db.execute_unprepared(WEIGH_ENTRIES_SQL).await?;
        db.execute_unprepared(PAYMENT_BATCHES_SQL).await?;

        // ============================================================
        // PART 3: HARVEST / SALE DOMAIN
        // ============================================================
        db.execute_unprepared(HARVESTS_SQL).await?;
        db.execute_unprepared(SALES_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_SQL).await?;
        Ok(())
    }
}

const LEDGER_ENTRIES_SQL: &str = r"
-- Append-only cash movements. Rows are never updated or deleted.
CREATE TABLE ledger_entries (
    id UUID PRIMARY KEY,
    company_id UUID NOT NULL,
    project_id UUID NOT NULL,
    entry_type VARCHAR(10) NOT NULL,
    amount NUMERIC(19, 4) NOT NULL,
    reason TEXT NOT NULL,
    ref_type VARCHAR(20) NOT NULL,
    ref_id TEXT,
    recorded_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    client_recorded_at TIMESTAMPTZ NOT NULL,
    actor_uid UUID NOT NULL,
    actor_name TEXT NOT NULL,
    idempotency_key TEXT,
    meta JSONB NOT NULL DEFAULT '{}'::jsonb,
    CONSTRAINT chk_ledger_amount_positive CHECK (amount > 0),
    CONSTRAINT chk_ledger_entry_type CHECK (entry_type IN ('CREDIT', 'DEBIT')),
    CONSTRAINT chk_ledger_ref_type CHECK (ref_type IN ('COLLECTION', 'PICKER', 'ADJUSTMENT', 'MANUAL'))
);

-- NULL keys are distinct, so keyless entries never collide
CREATE UNIQUE INDEX idx_ledger_idempotency
    ON ledger_entries(company_id, project_id, idempotency_key);

CREATE INDEX idx_ledger_project_time
    ON ledger_entries(company_id, project_id, client_recorded_at, id);

CREATE OR REPLACE FUNCTION prevent_ledger_mutation()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'ledger_entries is append-only';
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_ledger_append_only
    BEFORE UPDATE OR DELETE ON ledger_entries
    FOR EACH ROW EXECUTE FUNCTION prevent_ledger_mutation();
";

const WALLET_META_SQL: &str = r"
CREATE TABLE wallet_meta (
    company_id UUID NOT NULL,
    project_id UUID NOT NULL,
    migrated BOOLEAN NOT NULL DEFAULT false,
    migrated_at TIMESTAMPTZ,
    stats JSONB,
    PRIMARY KEY (company_id, project_id)
);
";

const LEGACY_WALLETS_SQL: &str = r"
-- Mutable aggregate wallets from before the ledger. Read by the migration only.
CREATE TABLE legacy_wallets (
    id UUID PRIMARY KEY,
    company_id UUID NOT NULL,
    project_id UUID NOT NULL,
    cash_received NUMERIC(19, 4) NOT NULL DEFAULT 0,
    cash_paid_out NUMERIC(19, 4) NOT NULL DEFAULT 0,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_legacy_wallets_project ON legacy_wallets(company_id, project_id);
";

const HARVEST_COLLECTIONS_SQL: &str = r"
CREATE TABLE harvest_collections (
    id UUID PRIMARY KEY,
    company_id UUID NOT NULL,
    project_id UUID NOT NULL,
    crop_type VARCHAR(64) NOT NULL,
    name VARCHAR(255) NOT NULL,
    harvest_date DATE NOT NULL,
    price_per_kg_picker NUMERIC(19, 4) NOT NULL,
    total_harvest_kg NUMERIC(19, 4) NOT NULL DEFAULT 0,
    total_picker_cost NUMERIC(19, 4) NOT NULL DEFAULT 0,
    price_per_kg_buyer NUMERIC(19, 4),
    total_revenue NUMERIC(19, 4),
    profit NUMERIC(19, 4),
    status VARCHAR(20) NOT NULL DEFAULT 'collecting',
    harvest_id UUID,
    buyer_paid_at TIMESTAMPTZ,
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_collection_status CHECK (status IN ('collecting', 'sold', 'payout_complete', 'closed')),
    CONSTRAINT chk_collection_picker_price CHECK (price_per_kg_picker > 0)
);

CREATE INDEX idx_collections_project ON harvest_collections(company_id, project_id, status);

-- Closed collections still waiting for their Harvest/Sale pair
CREATE INDEX idx_collections_unsynced
    ON harvest_collections(company_id, project_id)
    WHERE status = 'closed' AND harvest_id IS NULL;
";

const PICKERS_SQL: &str = r"
CREATE TABLE pickers (
    id UUID PRIMARY KEY,
    company_id UUID NOT NULL,
    collection_id UUID NOT NULL REFERENCES harvest_collections(id) ON DELETE CASCADE,
    picker_number INTEGER NOT NULL,
    picker_name VARCHAR(255) NOT NULL,
    total_kg NUMERIC(19, 4) NOT NULL DEFAULT 0,
    total_pay NUMERIC(19, 4) NOT NULL DEFAULT 0,
    is_paid BOOLEAN NOT NULL DEFAULT false,
    paid_at TIMESTAMPTZ,
    payment_batch_id UUID,
    payout_funding VARCHAR(20),
    CONSTRAINT uq_picker_number UNIQUE (collection_id, picker_number),
    CONSTRAINT chk_picker_funding CHECK (payout_funding IS NULL OR payout_funding IN ('ledger_tracked', 'externally_funded'))
);
";

const WEIGH_ENTRIES_SQL: &str = r"
CREATE TABLE weigh_entries (
    id UUID PRIMARY KEY,
    company_id UUID NOT NULL,
    picker_id UUID NOT NULL REFERENCES pickers(id) ON DELETE CASCADE,
    collection_id UUID NOT NULL REFERENCES harvest_collections(id) ON DELETE CASCADE,
    weight_kg NUMERIC(19, 4) NOT NULL,
    trip_number INTEGER NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_weigh_positive CHECK (weight_kg > 0)
);

CREATE INDEX idx_weigh_entries_collection ON weigh_entries(collection_id, picker_id);
";

const PAYMENT_BATCHES_SQL: &str = r"
CREATE TABLE payment_batches (
    id UUID PRIMARY KEY,
    company_id UUID NOT NULL,
    collection_id UUID NOT NULL REFERENCES harvest_collections(id),
    picker_ids JSONB NOT NULL,
    total_amount NUMERIC(19, 4) NOT NULL,
    paid_at TIMESTAMPTZ NOT NULL,
    CONSTRAINT chk_batch_total_positive CHECK (total_amount > 0)
);
";

const HARVESTS_SQL: &str = r"
CREATE TABLE harvests (
    id UUID PRIMARY KEY,
    company_id UUID NOT NULL,
    project_id UUID NOT NULL,
    crop_type VARCHAR(64) NOT NULL,
    harvest_date DATE NOT NULL,
    quantity_kg NUMERIC(19, 4) NOT NULL,
    source_collection_id UUID NOT NULL,
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_harvests_source ON harvests(source_collection_id, created_at);
";

const SALES_SQL: &str = r"
CREATE TABLE sales (
    id UUID PRIMARY KEY,
    harvest_id UUID NOT NULL REFERENCES harvests(id) ON DELETE CASCADE,
    company_id UUID NOT NULL,
    project_id UUID NOT NULL,
    quantity_kg NUMERIC(19, 4) NOT NULL,
    price_per_kg NUMERIC(19, 4) NOT NULL,
    total_amount NUMERIC(19, 4) NOT NULL,
    sale_date DATE NOT NULL,
    source_collection_id UUID NOT NULL
);

CREATE INDEX idx_sales_source ON sales(source_collection_id);
";

const DROP_SQL: &str = r"
DROP TABLE IF EXISTS sales CASCADE;
DROP TABLE IF EXISTS harvests CASCADE;
DROP TABLE IF EXISTS payment_batches CASCADE;
DROP TABLE IF EXISTS weigh_entries CASCADE;
DROP TABLE IF EXISTS pickers CASCADE;
DROP TABLE IF EXISTS harvest_collections CASCADE;
DROP TABLE IF EXISTS legacy_wallets CASCADE;
DROP TABLE IF EXISTS wallet_meta CASCADE;
DROP TABLE IF EXISTS ledger_entries CASCADE;
DROP FUNCTION IF EXISTS prevent_ledger_mutation();
";
