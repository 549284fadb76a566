//! Cursor pagination
//!
//! Offset listings follow the paging contract of [`keystone_core::cursor`]:
//! a full page emits a token for the next offset, a short page ends the
//! listing. Keyset listings resume after the last row's sort value and id.

use super::EntityStore;
use crate::mapper::Keyed;
use keystone_core::{
    decode_cursor, encode_cursor, next_offset_token, Context, Database, Error, KeysetCursor, Page,
    PageRequest, Result, Statement,
};

/// Placeholder bound to the page size by [`EntityStore::list_page`]
pub const PAGE_SIZE_PARAM: &str = "pageSize";
/// Placeholder bound to the row offset by [`EntityStore::list_page`]
pub const PAGE_OFFSET_PARAM: &str = "pageOffset";

impl<D: Database> EntityStore<D> {
    /// One offset page of an ordered statement
    ///
    /// `LIMIT @pageSize OFFSET @pageOffset` is appended to `base`, which must
    /// carry a total `ORDER BY` for pages to be stable.
    ///
    /// # Errors
    ///
    /// Returns `CorruptCursor` for an invalid page token.
    pub fn list_page<M: Keyed>(
        &self,
        ctx: &Context,
        base: &Statement,
        request: &PageRequest,
    ) -> Result<Page<M::Entity>> {
        self.list_page_with::<M, _>(ctx, request, |page_size, offset| {
            let offset = i64::try_from(offset)
                .map_err(|_| Error::corrupt_cursor("offset out of range"))?;
            Ok(Statement {
                sql: format!(
                    "{} LIMIT @{} OFFSET @{}",
                    base.sql, PAGE_SIZE_PARAM, PAGE_OFFSET_PARAM
                ),
                params: base.params.clone(),
            }
            .bind(PAGE_SIZE_PARAM, page_size as i64)
            .bind(PAGE_OFFSET_PARAM, offset))
        })
    }

    /// One offset page of a statement built by the caller
    ///
    /// `build` receives the effective page size and the offset decoded from
    /// the request's token and must return a statement selecting exactly that
    /// window.
    ///
    /// # Errors
    ///
    /// Returns `CorruptCursor` for an invalid page token, or `build`'s error.
    pub fn list_page_with<M, B>(
        &self,
        ctx: &Context,
        request: &PageRequest,
        build: B,
    ) -> Result<Page<M::Entity>>
    where
        M: Keyed,
        B: FnOnce(usize, u64) -> Result<Statement>,
    {
        let cursor = request.offset_cursor()?;
        let page_size = self.pagination.effective_page_size(Some(request.page_size));
        let statement = build(page_size, cursor.offset)?;
        let items = self.read_all::<M>(ctx, &statement)?;
        let next_page_token = next_offset_token(cursor, page_size, items.len())?;
        Ok(Page {
            items,
            next_page_token,
        })
    }

    /// One keyset page
    ///
    /// `build` receives the position to resume after (`None` on the first
    /// page) and the effective page size. `cursor_of` derives the position of
    /// an entity; the last entity of a full page becomes the next token.
    ///
    /// # Errors
    ///
    /// Returns `CorruptCursor` for an invalid page token, or `build`'s error.
    pub fn list_keyset_page<M, B, C>(
        &self,
        ctx: &Context,
        request: &PageRequest,
        build: B,
        cursor_of: C,
    ) -> Result<Page<M::Entity>>
    where
        M: Keyed,
        B: FnOnce(Option<&KeysetCursor>, usize) -> Result<Statement>,
        C: Fn(&M::Entity) -> KeysetCursor,
    {
        let after = match &request.page_token {
            Some(token) => Some(decode_cursor::<KeysetCursor>(token)?),
            None => None,
        };
        let page_size = self.pagination.effective_page_size(Some(request.page_size));
        let statement = build(after.as_ref(), page_size)?;
        let items = self.read_all::<M>(ctx, &statement)?;
        let next_page_token = if items.len() >= page_size {
            items
                .last()
                .map(|last| encode_cursor(&cursor_of(last)))
                .transpose()?
        } else {
            None
        };
        Ok(Page {
            items,
            next_page_token,
        })
    }
}
