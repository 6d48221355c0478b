//! Market creation and trading.
//!
//! [`MarketEngine`] owns every market and position. Mutating calls take
//! `&mut self`, the caller identity and the current time. Each one validates
//! and prices the whole operation first, applies its effects, then makes a
//! single ledger call. A refused transfer puts the captured records back.
//!
//! Settlement lives in [`crate::resolution`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use veris_ledger::{ensure_can_pull, TokenLedger};
use veris_types::authority::Authority;
use veris_types::events::{Event, EventKind, EventLog};
use veris_types::feed::FeedSource;
use veris_types::identity::short_hex;
use veris_types::{Address, Amount, FeedId, MarketId, Outcome, Timestamp};

use crate::market::{Market, MarketMetadata, MarketParams, MarketState, Position};
use crate::pricing::{self, Quote, SHARE_UNIT};
use crate::{MarketError, Result};

/// Arguments of [`MarketEngine::create_market`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketRequest {
    pub metadata: MarketMetadata,
    pub feed_id: FeedId,
    /// Seconds from creation until trading closes.
    pub duration: u64,
    /// Initial pool funded by the creator.
    pub liquidity: Amount,
}

/// Prediction market engine.
#[derive(Debug, Clone)]
pub struct MarketEngine {
    pub(crate) authority: Authority,
    pub(crate) custody: Address,
    pub(crate) fee_sink: Address,
    pub(crate) params: MarketParams,
    pub(crate) markets: BTreeMap<MarketId, Market>,
    pub(crate) positions: BTreeMap<(MarketId, Address), Position>,
    pub(crate) next_id: MarketId,
    /// Trading fees held in custody until swept.
    pub(crate) fees_accrued: Amount,
    pub(crate) events: EventLog,
}

impl MarketEngine {
    /// Build an engine with validated parameters.
    ///
    /// # Errors
    ///
    /// - [`MarketError::InvalidParams`] if `params` fail validation
    pub fn new(
        admin: Address,
        custody: Address,
        fee_sink: Address,
        params: MarketParams,
    ) -> Result<Self> {
        params.validate()?;
        tracing::info!(
            admin = short_hex(&admin),
            custody = short_hex(&custody),
            trade_fee_bps = params.trade_fee_bps,
            "market engine initialised"
        );
        Ok(Self {
            authority: Authority::new(admin),
            custody,
            fee_sink,
            params,
            markets: BTreeMap::new(),
            positions: BTreeMap::new(),
            next_id: 1,
            fees_accrued: 0,
            events: EventLog::new(),
        })
    }

    /// Halt every state-mutating entry point. Admin only.
    pub fn pause(&mut self, caller: Address, now: Timestamp) -> Result<()> {
        self.authority.pause(&caller)?;
        self.events.emit(now, EventKind::Paused);
        Ok(())
    }

    /// Lift a pause. Admin only.
    pub fn resume(&mut self, caller: Address, now: Timestamp) -> Result<()> {
        self.authority.resume(&caller)?;
        self.events.emit(now, EventKind::Resumed);
        Ok(())
    }

    /// Open a market bound to `request.feed_id`.
    ///
    /// Pulls `request.liquidity` from `creator` and credits it
    /// `liquidity / SHARE_UNIT` locked shares of each outcome.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Paused`]
    /// - [`MarketError::UnknownFeed`] / [`MarketError::FeedInactive`]
    /// - [`MarketError::LiquidityTooLow`]
    /// - [`MarketError::InvalidDuration`] if zero or above the maximum
    /// - [`MarketError::InvalidMetadata`] if the question is empty or too long
    /// - [`MarketError::Ledger`] if the liquidity cannot be pulled
    pub fn create_market<L, F>(
        &mut self,
        ledger: &mut L,
        feeds: &F,
        creator: Address,
        request: MarketRequest,
        now: Timestamp,
    ) -> Result<MarketId>
    where
        L: TokenLedger + ?Sized,
        F: FeedSource + ?Sized,
    {
        self.authority.ensure_operational()?;
        let feed = feeds
            .feed_snapshot(&request.feed_id)
            .ok_or(MarketError::UnknownFeed(request.feed_id))?;
        if !feed.active {
            return Err(MarketError::FeedInactive(request.feed_id));
        }
        if request.liquidity < self.params.min_liquidity {
            return Err(MarketError::LiquidityTooLow {
                required: self.params.min_liquidity,
                provided: request.liquidity,
            });
        }
        if request.duration == 0 || request.duration > self.params.max_duration {
            return Err(MarketError::InvalidDuration {
                duration: request.duration,
                max: self.params.max_duration,
            });
        }
        request.metadata.validate()?;

        let end_time = now
            .checked_add(request.duration)
            .ok_or(MarketError::Overflow("end time"))?;
        let seed_shares = request.liquidity / SHARE_UNIT;
        let curve_k = pricing::curve_constant(seed_shares)?;
        let market_id = self.next_id;
        let next_id = market_id
            .checked_add(1)
            .ok_or(MarketError::Overflow("market id"))?;
        ensure_can_pull(ledger, &self.custody, &creator, request.liquidity)?;

        let market = Market {
            id: market_id,
            metadata: request.metadata,
            feed_id: request.feed_id,
            creator,
            created_at: now,
            end_time,
            initial_liquidity: request.liquidity,
            pool_value: request.liquidity,
            yes_supply: seed_shares,
            no_supply: seed_shares,
            curve_k,
            seed_shares,
            state: MarketState::Open,
            settlement: None,
        };
        let event = EventKind::MarketCreated {
            market_id,
            feed_id: market.feed_id,
            creator,
            question: market.metadata.question.clone(),
            liquidity: request.liquidity,
            seed_shares,
            end_time,
        };
        self.markets.insert(market_id, market);
        self.positions.insert(
            (market_id, creator),
            Position {
                yes: seed_shares,
                no: seed_shares,
                locked: seed_shares,
            },
        );
        self.next_id = next_id;

        if let Err(err) =
            ledger.transfer_from(&self.custody, &creator, &self.custody, request.liquidity)
        {
            self.markets.remove(&market_id);
            self.positions.remove(&(market_id, creator));
            self.next_id = market_id;
            return Err(err.into());
        }

        tracing::info!(
            market_id,
            feed = short_hex(&request.feed_id),
            creator = short_hex(&creator),
            liquidity = request.liquidity,
            seed_shares,
            end_time,
            "market created"
        );
        self.events.emit(now, event);
        Ok(market_id)
    }

    /// Buy `shares` of `outcome`, paying exactly the [`calculate_cost`] quote.
    ///
    /// [`calculate_cost`]: MarketEngine::calculate_cost
    ///
    /// # Errors
    ///
    /// - [`MarketError::Paused`] / [`MarketError::UnknownMarket`]
    /// - [`MarketError::MarketNotOpen`] / [`MarketError::MarketEnded`]
    /// - [`MarketError::InvalidAmount`] if `shares` is zero
    /// - [`MarketError::Ledger`] if the payment cannot be pulled
    pub fn buy_shares<L: TokenLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        buyer: Address,
        market_id: MarketId,
        outcome: Outcome,
        shares: u64,
        now: Timestamp,
    ) -> Result<Quote> {
        self.authority.ensure_operational()?;
        let market = self.market_or_err(market_id)?;
        market.ensure_tradable(now)?;
        if shares == 0 {
            return Err(MarketError::InvalidAmount);
        }

        let supply = market.supply(outcome);
        let quote = pricing::quote_buy(supply, shares, market.curve_k, self.params.trade_fee_bps)?;
        let new_supply = supply
            .checked_add(shares)
            .ok_or(MarketError::Overflow("supply"))?;
        let new_pool = market
            .pool_value
            .checked_add(quote.gross)
            .ok_or(MarketError::Overflow("pool"))?;
        let new_fees = self
            .fees_accrued
            .checked_add(quote.fee)
            .ok_or(MarketError::Overflow("fees"))?;
        let key = (market_id, buyer);
        let previous_position = self.positions.get(&key).cloned();
        let mut position = previous_position.clone().unwrap_or_default();
        *position.balance_mut(outcome) = position
            .balance(outcome)
            .checked_add(shares)
            .ok_or(MarketError::Overflow("position"))?;
        ensure_can_pull(ledger, &self.custody, &buyer, quote.net)?;

        let previous_market = market.clone();
        let previous_fees = self.fees_accrued;
        if let Some(market) = self.markets.get_mut(&market_id) {
            *market.supply_mut(outcome) = new_supply;
            market.pool_value = new_pool;
        }
        self.positions.insert(key, position);
        self.fees_accrued = new_fees;

        if let Err(err) = ledger.transfer_from(&self.custody, &buyer, &self.custody, quote.net) {
            self.markets.insert(market_id, previous_market);
            self.restore_position(key, previous_position);
            self.fees_accrued = previous_fees;
            return Err(err.into());
        }

        tracing::debug!(
            market_id,
            buyer = short_hex(&buyer),
            %outcome,
            shares,
            cost = quote.net,
            fee = quote.fee,
            "shares bought"
        );
        self.events.emit(
            now,
            EventKind::SharesBought {
                market_id,
                buyer,
                outcome,
                shares,
                cost: quote.net,
                fee: quote.fee,
            },
        );
        Ok(quote)
    }

    /// Sell `shares` of `outcome` back to the pool for exactly the
    /// [`calculate_refund`] quote. Seed shares cannot be sold.
    ///
    /// [`calculate_refund`]: MarketEngine::calculate_refund
    ///
    /// # Errors
    ///
    /// - [`MarketError::Paused`] / [`MarketError::UnknownMarket`]
    /// - [`MarketError::MarketNotOpen`] / [`MarketError::MarketEnded`]
    /// - [`MarketError::InvalidAmount`] if `shares` is zero
    /// - [`MarketError::InsufficientShares`] if the unlocked balance is short
    /// - [`MarketError::Ledger`] if the payout fails
    pub fn sell_shares<L: TokenLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        seller: Address,
        market_id: MarketId,
        outcome: Outcome,
        shares: u64,
        now: Timestamp,
    ) -> Result<Quote> {
        self.authority.ensure_operational()?;
        let market = self.market_or_err(market_id)?;
        market.ensure_tradable(now)?;
        if shares == 0 {
            return Err(MarketError::InvalidAmount);
        }

        let key = (market_id, seller);
        let previous_position = self.positions.get(&key).cloned();
        let held = previous_position
            .as_ref()
            .map(|p| p.sellable(outcome))
            .unwrap_or(0);
        if held < shares {
            return Err(MarketError::InsufficientShares {
                held,
                requested: shares,
            });
        }

        let supply = market.supply(outcome);
        let quote =
            pricing::quote_sell(supply, shares, market.curve_k, self.params.trade_fee_bps)?;
        let new_pool = market
            .pool_value
            .checked_sub(quote.gross)
            .ok_or(MarketError::Overflow("pool"))?;
        let new_fees = self
            .fees_accrued
            .checked_add(quote.fee)
            .ok_or(MarketError::Overflow("fees"))?;
        let mut position = previous_position.clone().unwrap_or_default();
        *position.balance_mut(outcome) -= shares;

        let previous_market = market.clone();
        let previous_fees = self.fees_accrued;
        if let Some(market) = self.markets.get_mut(&market_id) {
            *market.supply_mut(outcome) = supply - shares;
            market.pool_value = new_pool;
        }
        self.positions.insert(key, position);
        self.fees_accrued = new_fees;

        if quote.net > 0 {
            if let Err(err) = ledger.transfer(&self.custody, &seller, quote.net) {
                self.markets.insert(market_id, previous_market);
                self.restore_position(key, previous_position);
                self.fees_accrued = previous_fees;
                return Err(err.into());
            }
        }

        tracing::debug!(
            market_id,
            seller = short_hex(&seller),
            %outcome,
            shares,
            refund = quote.net,
            fee = quote.fee,
            "shares sold"
        );
        self.events.emit(
            now,
            EventKind::SharesSold {
                market_id,
                seller,
                outcome,
                shares,
                refund: quote.net,
                fee: quote.fee,
            },
        );
        Ok(quote)
    }

    /// Send accrued trading fees from custody to the fee sink.
    ///
    /// # Errors
    ///
    /// - [`MarketError::Paused`]
    /// - [`MarketError::NothingToSweep`] if no fees have accrued
    /// - [`MarketError::Ledger`] if the transfer fails; nothing changes
    pub fn sweep_fees<L: TokenLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        caller: Address,
        now: Timestamp,
    ) -> Result<Amount> {
        self.authority.ensure_operational()?;
        let amount = self.fees_accrued;
        if amount == 0 {
            return Err(MarketError::NothingToSweep);
        }

        self.fees_accrued = 0;
        if let Err(err) = ledger.transfer(&self.custody, &self.fee_sink, amount) {
            self.fees_accrued = amount;
            return Err(err.into());
        }

        tracing::info!(
            amount,
            fee_sink = short_hex(&self.fee_sink),
            swept_by = short_hex(&caller),
            "trading fees swept"
        );
        self.events.emit(
            now,
            EventKind::FeesSwept {
                fee_sink: self.fee_sink,
                amount,
            },
        );
        Ok(amount)
    }

    // ---------------------------------------------------------------------
    // Quotes and queries
    // ---------------------------------------------------------------------

    /// Price of buying `shares` of `outcome` right now, fee included.
    ///
    /// # Errors
    ///
    /// - [`MarketError::UnknownMarket`]
    /// - [`MarketError::InvalidAmount`] if `shares` is zero
    pub fn calculate_cost(&self, market_id: MarketId, outcome: Outcome, shares: u64) -> Result<Quote> {
        let market = self.market_or_err(market_id)?;
        if shares == 0 {
            return Err(MarketError::InvalidAmount);
        }
        pricing::quote_buy(
            market.supply(outcome),
            shares,
            market.curve_k,
            self.params.trade_fee_bps,
        )
    }

    /// Proceeds of selling `shares` of `outcome` right now, fee deducted.
    ///
    /// # Errors
    ///
    /// - [`MarketError::UnknownMarket`]
    /// - [`MarketError::InvalidAmount`] if `shares` is zero
    /// - [`MarketError::InsufficientShares`] if `shares` exceeds the supply
    pub fn calculate_refund(
        &self,
        market_id: MarketId,
        outcome: Outcome,
        shares: u64,
    ) -> Result<Quote> {
        let market = self.market_or_err(market_id)?;
        if shares == 0 {
            return Err(MarketError::InvalidAmount);
        }
        pricing::quote_sell(
            market.supply(outcome),
            shares,
            market.curve_k,
            self.params.trade_fee_bps,
        )
    }

    /// Marginal price of `outcome` in base units per share.
    pub fn price(&self, market_id: MarketId, outcome: Outcome) -> Result<Amount> {
        let market = self.market_or_err(market_id)?;
        Ok(pricing::marginal_price(market.supply(outcome), market.curve_k))
    }

    pub fn market(&self, market_id: MarketId) -> Option<&Market> {
        self.markets.get(&market_id)
    }

    pub fn market_ids(&self) -> Vec<MarketId> {
        self.markets.keys().copied().collect()
    }

    pub fn position(&self, market_id: MarketId, holder: &Address) -> Option<&Position> {
        self.positions.get(&(market_id, *holder))
    }

    pub fn params(&self) -> &MarketParams {
        &self.params
    }

    pub fn is_paused(&self) -> bool {
        self.authority.is_paused()
    }

    pub fn custody(&self) -> &Address {
        &self.custody
    }

    pub fn fees_accrued(&self) -> Amount {
        self.fees_accrued
    }

    /// Pool values still owed to holders plus unswept fees.
    pub fn custodied(&self) -> u128 {
        let pools: u128 = self
            .markets
            .values()
            .map(|m| u128::from(m.pool_value))
            .sum();
        pools + u128::from(self.fees_accrued)
    }

    /// Take every event published since the last drain.
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }

    pub fn pending_events(&self) -> &[Event] {
        self.events.pending()
    }

    pub(crate) fn market_or_err(&self, market_id: MarketId) -> Result<&Market> {
        self.markets
            .get(&market_id)
            .ok_or(MarketError::UnknownMarket(market_id))
    }

    pub(crate) fn restore_position(
        &mut self,
        key: (MarketId, Address),
        previous: Option<Position>,
    ) {
        match previous {
            Some(position) => {
                self.positions.insert(key, position);
            }
            None => {
                self.positions.remove(&key);
            }
        }
    }
}
