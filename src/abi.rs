use alloy::sol;

sol! {
    /// ERC20 allowance and ERC721 single-token approval share this selector.
    function approve(address spender, uint256 value) external returns (bool);

    /// ERC721 / ERC1155 operator approval over a whole collection.
    function setApprovalForAll(address operator, bool approved) external;

    function allowance(address owner, address spender) external view returns (uint256);
}
