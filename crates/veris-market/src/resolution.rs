//! Resolution, cancellation and claims.
//!
//! Resolution snapshots the pool and the winning supply once; every claim is
//! paid against that snapshot:
//!
//! ```text
//! payout = floor(pool_value * balance / winning_supply)
//! ```
//!
//! Every winning share is held by someone, so the claims sum to at most the
//! snapshotted pool. Rounding dust stays in custody. A cancelled market pays
//! both sides the same way over the total supply.

use veris_ledger::TokenLedger;
use veris_types::events::EventKind;
use veris_types::feed::FeedSource;
use veris_types::identity::short_hex;
use veris_types::{Address, Amount, MarketId, Outcome, Timestamp};

use crate::engine::MarketEngine;
use crate::market::{MarketState, Settlement};
use crate::{MarketError, Result};

/// `pool * shares / supply`, rounded down.
fn pro_rata(pool: Amount, shares: u64, supply: u64) -> Result<Amount> {
    if supply == 0 {
        return Ok(0);
    }
    let payout = u128::from(pool) * u128::from(shares) / u128::from(supply);
    Amount::try_from(payout).map_err(|_| MarketError::Overflow("payout"))
}

impl MarketEngine {
    /// Settle a market against its feed. Any caller may resolve.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Paused`] / [`MarketError::UnknownMarket`]
    /// - [`MarketError::AlreadyResolved`] / [`MarketError::MarketNotOpen`] if cancelled
    /// - [`MarketError::MarketNotEnded`] if `now` is before the end time
    /// - [`MarketError::UnknownFeed`] if the bound feed vanished from `feeds`
    /// - [`MarketError::FeedNotResolved`] without a feed value resolved
    ///   since the market was created
    pub fn resolve_market<F: FeedSource + ?Sized>(
        &mut self,
        feeds: &F,
        market_id: MarketId,
        now: Timestamp,
    ) -> Result<Outcome> {
        self.authority.ensure_operational()?;
        let market = self.market_or_err(market_id)?;
        match market.state {
            MarketState::Open => {}
            MarketState::Resolved => return Err(MarketError::AlreadyResolved(market_id)),
            MarketState::Cancelled => return Err(MarketError::MarketNotOpen(market_id)),
        }
        if !market.has_ended(now) {
            return Err(MarketError::MarketNotEnded {
                market_id,
                end_time: market.end_time,
            });
        }
        let feed = feeds
            .feed_snapshot(&market.feed_id)
            .ok_or(MarketError::UnknownFeed(market.feed_id))?;
        let (feed_value, feed_resolved_at) = feed
            .value_since(market.created_at)
            .ok_or(MarketError::FeedNotResolved(market.feed_id))?;

        let winning_outcome = market.metadata.criterion.evaluate(feed_value);
        let settlement = Settlement::Resolved {
            winning_outcome,
            feed_value,
            feed_resolved_at,
            pool_value: market.pool_value,
            winning_supply: market.supply(winning_outcome),
            settled_at: now,
        };
        let event = EventKind::MarketResolved {
            market_id,
            winning_outcome,
            feed_value,
            feed_resolved_at,
            pool_value: market.pool_value,
            winning_supply: market.supply(winning_outcome),
        };

        if let Some(market) = self.markets.get_mut(&market_id) {
            market.state = MarketState::Resolved;
            market.settlement = Some(settlement);
        }
        tracing::info!(
            market_id,
            winner = %winning_outcome,
            feed_value,
            "market resolved"
        );
        self.events.emit(now, event);
        Ok(winning_outcome)
    }

    /// Pay out the caller's winning shares.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Paused`] / [`MarketError::UnknownMarket`]
    /// - [`MarketError::MarketNotResolved`] unless the market is resolved
    /// - [`MarketError::NothingToClaim`] without winning shares, including
    ///   on a second claim
    /// - [`MarketError::Ledger`] if the payout fails; nothing changes
    pub fn claim_winnings<L: TokenLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        holder: Address,
        market_id: MarketId,
        now: Timestamp,
    ) -> Result<Amount> {
        self.authority.ensure_operational()?;
        let market = self.market_or_err(market_id)?;
        let Some(Settlement::Resolved {
            winning_outcome,
            pool_value,
            winning_supply,
            ..
        }) = market.settlement
        else {
            return Err(MarketError::MarketNotResolved(market_id));
        };

        let key = (market_id, holder);
        let previous_position = self.positions.get(&key).cloned();
        let shares = previous_position
            .as_ref()
            .map(|p| p.balance(winning_outcome))
            .unwrap_or(0);
        if shares == 0 {
            return Err(MarketError::NothingToClaim);
        }
        let payout = pro_rata(pool_value, shares, winning_supply)?;

        self.settle_claim(ledger, key, previous_position, payout, |position| {
            *position.balance_mut(winning_outcome) = 0;
        })?;

        tracing::info!(
            market_id,
            holder = short_hex(&holder),
            shares,
            payout,
            "winnings claimed"
        );
        self.events.emit(
            now,
            EventKind::WinningsClaimed {
                market_id,
                holder,
                shares,
                payout,
            },
        );
        Ok(payout)
    }

    /// Stop an open market and make every share refundable. Admin only.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Paused`] / [`MarketError::Unauthorized`]
    /// - [`MarketError::UnknownMarket`]
    /// - [`MarketError::MarketNotOpen`] if already resolved or cancelled
    pub fn cancel_market(
        &mut self,
        caller: Address,
        market_id: MarketId,
        now: Timestamp,
    ) -> Result<()> {
        self.authority.ensure_operational()?;
        self.authority.ensure_admin(&caller)?;
        let market = self.market_or_err(market_id)?;
        if market.state != MarketState::Open {
            return Err(MarketError::MarketNotOpen(market_id));
        }
        let total_supply = market
            .yes_supply
            .checked_add(market.no_supply)
            .ok_or(MarketError::Overflow("supply"))?;
        let pool_value = market.pool_value;

        if let Some(market) = self.markets.get_mut(&market_id) {
            market.state = MarketState::Cancelled;
            market.settlement = Some(Settlement::Cancelled {
                pool_value,
                total_supply,
                settled_at: now,
            });
        }
        tracing::warn!(market_id, pool_value, "market cancelled");
        self.events.emit(
            now,
            EventKind::MarketCancelled {
                market_id,
                pool_value,
            },
        );
        Ok(())
    }

    /// Refund the caller's shares of a cancelled market.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Paused`] / [`MarketError::UnknownMarket`]
    /// - [`MarketError::MarketNotResolved`] unless the market is cancelled
    /// - [`MarketError::NothingToClaim`] without shares
    /// - [`MarketError::Ledger`] if the payout fails; nothing changes
    pub fn claim_refund<L: TokenLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        holder: Address,
        market_id: MarketId,
        now: Timestamp,
    ) -> Result<Amount> {
        self.authority.ensure_operational()?;
        let market = self.market_or_err(market_id)?;
        let Some(Settlement::Cancelled {
            pool_value,
            total_supply,
            ..
        }) = market.settlement
        else {
            return Err(MarketError::MarketNotResolved(market_id));
        };

        let key = (market_id, holder);
        let previous_position = self.positions.get(&key).cloned();
        let shares = previous_position
            .as_ref()
            .map(|p| p.yes.saturating_add(p.no))
            .unwrap_or(0);
        if shares == 0 {
            return Err(MarketError::NothingToClaim);
        }
        let payout = pro_rata(pool_value, shares, total_supply)?;

        self.settle_claim(ledger, key, previous_position, payout, |position| {
            position.yes = 0;
            position.no = 0;
        })?;

        tracing::info!(
            market_id,
            holder = short_hex(&holder),
            shares,
            payout,
            "refund claimed"
        );
        self.events.emit(
            now,
            EventKind::RefundClaimed {
                market_id,
                holder,
                shares,
                payout,
            },
        );
        Ok(payout)
    }

    /// Zero the claimed side, debit the market's remaining pool and pay out.
    fn settle_claim<L: TokenLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        key: (MarketId, Address),
        previous_position: Option<crate::Position>,
        payout: Amount,
        clear: impl FnOnce(&mut crate::Position),
    ) -> Result<()> {
        let (market_id, holder) = key;
        let previous_market = self.market_or_err(market_id)?.clone();
        let remaining = previous_market
            .pool_value
            .checked_sub(payout)
            .ok_or(MarketError::Overflow("pool"))?;

        let mut position = previous_position.clone().unwrap_or_default();
        clear(&mut position);
        self.positions.insert(key, position);
        if let Some(market) = self.markets.get_mut(&market_id) {
            market.pool_value = remaining;
        }

        if payout > 0 {
            if let Err(err) = ledger.transfer(&self.custody, &holder, payout) {
                self.markets.insert(market_id, previous_market);
                self.restore_position(key, previous_position);
                return Err(err.into());
            }
        }
        Ok(())
    }
}
