//! CSS bindings into the external provider-search page.
//!
//! These selectors are a versioned contract with the external site: any
//! markup change there breaks the scrape and must be absorbed here, in one
//! place, and nowhere else. The site is a Salesforce Lightning page, hence
//! the deeply nested paths sharing the same prefix down to the search
//! component's `div.mainContent` panel.

/// One-time filter setup: each combobox is opened via its toggle and a fixed
/// option is clicked. Applied once per session, not per query.
pub const TYPE_FILTER_TOGGLE: &str = "#combobox-button-6";
pub const TYPE_FILTER_OPTION: &str = "#combobox-button-6-0-6";
pub const COUNTY_FILTER_TOGGLE: &str = "#combobox-button-10";
pub const COUNTY_FILTER_OPTION: &str = "#combobox-button-10-1-10";

/// Free-text facility-name input, reused (cleared + retyped) per query.
pub const NAME_INPUT: &str = "#input-14";

pub const SEARCH_BUTTON: &str = "body > div.siteforcePrmBody > div.cCenterPanel.slds-m-top--x-large.slds-p-horizontal--medium > div > div > div > div > div.cb-section_row.slds-grid.slds-wrap.slds-large-nowrap > div > div > div:nth-child(2) > c-rs_-t-u-l-i-p_-l-t-c-search > div.mainContent > div.contentBackground > div.buttonContainer > button.contentButton2";

pub const RESULTS_CONTAINER: &str = "body > div.siteforcePrmBody > div.cCenterPanel.slds-m-top--x-large.slds-p-horizontal--medium > div > div > div > div > div.cb-section_row.slds-grid.slds-wrap.slds-large-nowrap > div > div > div:nth-child(2) > c-rs_-t-u-l-i-p_-l-t-c-search > div.mainContent > div.lightningTableContainer";

pub const FIRST_RESULT_ROW: &str = "body > div.siteforcePrmBody > div.cCenterPanel.slds-m-top--x-large.slds-p-horizontal--medium > div > div > div > div > div.cb-section_row.slds-grid.slds-wrap.slds-large-nowrap > div > div > div:nth-child(2) > c-rs_-t-u-l-i-p_-l-t-c-search > div.mainContent > div.lightningTableContainer > div:nth-child(1) > lightning-datatable > div.dt-outer-container > div > div > table > tbody > tr";

/// Column positions within the first result row. The provider name is the
/// row's `th` header cell; the rest are 1-based `td:nth-child` positions.
pub const COL_ADDRESS: usize = 2;
pub const COL_CITY: usize = 3;
pub const COL_COUNTY: usize = 4;
pub const COL_ZIPCODE: usize = 5;

/// Selector for the first row's provider-name header cell.
pub fn name_cell() -> String {
    format!("{FIRST_RESULT_ROW} > th")
}

/// Selector for a positional data cell within the first row.
pub fn data_cell(column: usize) -> String {
    format!("{FIRST_RESULT_ROW} > td:nth-child({column})")
}
